//! Config inspection and editing.

use super::Context;

/// `config` prints everything, `config <key>` one value, `config <key>
/// <value>` writes.
pub fn run(ctx: &Context, key: Option<String>, value: Option<String>) -> anyhow::Result<()> {
    match (key, value) {
        (None, _) => {
            println!("{}", serde_json::to_string_pretty(&ctx.config)?);
            Ok(())
        }
        (Some(key), None) => {
            let value = ctx.config.get_key(&key)?;
            println!("{value}");
            Ok(())
        }
        (Some(key), Some(raw)) => {
            let mut config = ctx.config.clone();
            config.set_key(&key, &raw)?;
            config.save(&ctx.config_path)?;
            println!("{key} = {}", config.get_key(&key)?);
            Ok(())
        }
    }
}
