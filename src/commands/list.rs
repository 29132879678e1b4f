//! List command - print index names

use anyhow::Result;

use scrapscope::core::config::Config;

use super::open_store;

pub fn run(json: bool, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let names = store.list_collections()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in names {
            println!("{}", name);
        }
    }

    Ok(())
}
