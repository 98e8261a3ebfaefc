//! `dakhla cache-maintain` — purge expired consolidated entries.

use anyhow::Result;

use super::Context;

pub fn run(ctx: &Context) -> Result<()> {
    let removed = ctx.cache.maintenance()?;
    println!("removed {removed} expired cache entries");
    Ok(())
}
