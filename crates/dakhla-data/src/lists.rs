//! Curated universe membership lists.
//!
//! Static snapshots maintained by hand; survivorship-aware reconstruction
//! is out of scope, so these represent current membership. Symbols are
//! uppercase and deduplicated at the provider layer.

pub(crate) const SP500: &[&str] = &[
    "A", "AAPL", "ABBV", "ABT", "ACN", "ADBE", "ADI", "ADM", "ADP", "ADSK", "AEE", "AEP", "AFL",
    "AIG", "AJG", "ALL", "AMAT", "AMD", "AME", "AMGN", "AMP", "AMT", "AMZN", "ANET", "AON", "APD",
    "APH", "APO", "AVGO", "AXP", "AZO", "BA", "BAC", "BDX", "BK", "BKNG", "BLK", "BMY", "BRO",
    "BSX", "C", "CAH", "CARR", "CAT", "CB", "CDNS", "CEG", "CI", "CL", "CMCSA", "CME", "CMG",
    "CMI", "COF", "COP", "COST", "CPRT", "CRM", "CSCO", "CSX", "CTAS", "CVS", "CVX", "D", "DAL",
    "DE", "DELL", "DHI", "DHR", "DIS", "DOV", "DOW", "DUK", "ECL", "ED", "EMR", "EOG", "EQIX",
    "ETN", "EW", "EXC", "F", "FAST", "FCX", "FDX", "FI", "FIS", "FTNT", "GD", "GE", "GEV", "GILD",
    "GIS", "GM", "GOOGL", "GS", "GWW", "HCA", "HD", "HIG", "HLT", "HON", "HPQ", "HUM", "IBM",
    "ICE", "INTC", "INTU", "ISRG", "ITW", "JCI", "JNJ", "JPM", "KLAC", "KMB", "KMI", "KO", "KR",
    "LEN", "LHX", "LIN", "LLY", "LMT", "LOW", "LRCX", "MA", "MAR", "MCD", "MCK", "MCO", "MDLZ",
    "MDT", "MET", "META", "MMC", "MMM", "MO", "MPC", "MRK", "MS", "MSFT", "MSI", "MU", "NEE",
    "NEM", "NKE", "NOC", "NOW", "NSC", "NUE", "NVDA", "NXPI", "ORCL", "ORLY", "OTIS", "OXY",
    "PANW", "PAYX", "PCAR", "PEP", "PFE", "PG", "PGR", "PH", "PLD", "PLTR", "PM", "PNC", "PSA",
    "PSX", "PYPL", "QCOM", "REGN", "RCL", "ROK", "ROP", "ROST", "RSG", "RTX", "SBUX", "SCHW",
    "SHW", "SLB", "SNPS", "SO", "SPG", "SPGI", "SRE", "STZ", "SYK", "SYY", "T", "TDG", "TGT",
    "TJX", "TMO", "TMUS", "TRV", "TSLA", "TT", "TXN", "UNH", "UNP", "UPS", "URI", "USB", "V",
    "VLO", "VRTX", "VZ", "WELL", "WFC", "WM", "WMB", "WMT", "XOM", "YUM", "ZTS",
];

pub(crate) const NASDAQ100: &[&str] = &[
    "AAPL", "ABNB", "ADBE", "ADI", "ADP", "ADSK", "AEP", "AMAT", "AMD", "AMGN", "AMZN", "ANSS",
    "APP", "ARM", "ASML", "AVGO", "AXON", "AZN", "BIIB", "BKNG", "BKR", "CCEP", "CDNS", "CDW",
    "CEG", "CHTR", "CMCSA", "COST", "CPRT", "CRWD", "CSCO", "CSGP", "CSX", "CTAS", "CTSH",
    "DASH", "DDOG", "DXCM", "EA", "EXC", "FANG", "FAST", "FTNT", "GEHC", "GFS", "GILD", "GOOGL",
    "HON", "IDXX", "INTC", "INTU", "ISRG", "KDP", "KHC", "KLAC", "LIN", "LRCX", "LULU", "MAR",
    "MCHP", "MDB", "MDLZ", "MELI", "META", "MNST", "MRVL", "MSFT", "MSTR", "MU", "NFLX", "NVDA",
    "NXPI", "ODFL", "ON", "ORLY", "PANW", "PAYX", "PCAR", "PDD", "PEP", "PLTR", "PYPL", "QCOM",
    "REGN", "ROP", "ROST", "SBUX", "SNPS", "TEAM", "TMUS", "TSLA", "TTD", "TTWO", "TXN", "VRSK",
    "VRTX", "WBD", "WDAY", "XEL", "ZS",
];

pub(crate) const RUSSELL2000: &[&str] = &[
    "AAON", "ABCB", "ACIW", "ACLS", "AEIS", "AEO", "AGYS", "AIN", "AIT", "ALKS", "ALRM", "AMBA",
    "AMN", "ANDE", "ANF", "APAM", "APLE", "ARCB", "AROC", "ARWR", "ASB", "ASGN", "ATGE", "AUB",
    "AVAV", "AWR", "AX", "AXNX", "AZZ", "BANF", "BCPC", "BDC", "BGC", "BHE", "BJRI", "BKU",
    "BL", "BLKB", "BMI", "BOH", "BOOT", "BOX", "BRC", "BXMT", "CABO", "CAKE", "CALM", "CARG",
    "CASH", "CATY", "CBT", "CBU", "CCOI", "CEIX", "CENT", "CHCO", "CHEF", "CNK", "CNMD", "CNS",
    "COLB", "COOP", "CORT", "CPK", "CRC", "CRVL", "CSGS", "CUBI", "CVBF", "CVCO", "CWT", "DFIN",
    "DGII", "DIOD", "DOCN", "DORM", "DY", "EAT", "EBC", "ENSG", "ENVA", "EPAC", "EPRT", "ESE",
    "EVTC", "EXLS", "EXPO", "FELE", "FFBC", "FFIN", "FIZZ", "FLO", "FN", "FORM", "FOXF", "FSS",
    "FUL", "FULT", "GBCI", "GEO", "GKOS", "GMS", "GPI", "GSHD", "GTLS", "HAE", "HALO", "HASI",
    "HELE", "HLIT", "HNI", "HOMB", "HP", "HUBG", "HWC", "IBOC", "IDCC", "INDB", "IOSP", "IPAR",
    "ITGR", "ITRI", "JBT", "JJSF", "JOE", "KAI", "KFY", "KLIC", "KRYS", "KTB", "LANC", "LCII",
    "LGND", "LIVN", "LKFN", "LNTH", "LPG", "LXP", "MANT", "MATX", "MCY", "MGEE", "MGPI", "MHO",
    "MLI", "MMSI", "MOG-A", "MTH", "MTRN", "MXL", "MYGN", "NAVI", "NEOG", "NHC", "NMIH", "NPO",
    "NSIT", "NWBI", "NX", "OII", "ONB", "OSIS", "OTTR", "PATK", "PBH", "PDCO", "PECO", "PIPR",
    "PLAB", "PLXS", "POWI", "POWL", "PRGS", "PRLB", "QLYS", "RAMP", "RDN", "ROCK", "ROG", "RUSHA",
    "SAFT", "SANM", "SATS", "SEM", "SFNC", "SHOO", "SIG", "SITM", "SKYW", "SLAB", "SLG", "SM",
    "SMPL", "SNEX", "SPSC", "SPXC", "STRA", "SXT", "TDS", "TFIN", "TGNA", "THS", "TNC", "TPH",
    "TRMK", "TTMI", "UBSI", "UCBI", "UE", "UFPT", "UMBF", "UNF", "VCEL", "VECO", "VICR", "VRRM",
    "WABC", "WAFD", "WD", "WDFC", "WERN", "WGO", "WSFS", "WTS", "YELP", "ZWS",
];
