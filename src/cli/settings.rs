use std::error::Error;
use std::path::PathBuf;

use chrono::Local;

use super::{CliContext, SettingsCommands};
use crate::core::config::appearance::Appearance;
use crate::core::config::data::path_display;
use crate::core::config::printing::format_setting_value;
use crate::core::config::settings::canonical_key;

pub fn run(ctx: &CliContext, command: SettingsCommands) -> Result<(), Box<dyn Error>> {
    let store = &ctx.settings_store;
    match command {
        SettingsCommands::Show => {
            store.load().print_all();
            println!("\nFile: {}", path_display(store.path()));
        }
        SettingsCommands::Get { key } => {
            let value = store.load().get(&key)?;
            println!("{}", format_setting_value(&value));
        }
        SettingsCommands::Set { key, value } => {
            let raw = value.join(" ");
            let updated = store.set(&key, &raw)?;
            let key = canonical_key(&key).unwrap_or(key.as_str());
            let shown = updated.get(key)?;
            println!("✅ Set {key} to: {}", format_setting_value(&shown));
        }
        SettingsCommands::Reset => {
            store.reset()?;
            println!("✅ Settings restored to defaults");
        }
        SettingsCommands::Export { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            let path = store.export_to_dir(&dir, Local::now().date_naive())?;
            println!("✅ Exported settings to {}", path_display(&path));
        }
        SettingsCommands::Import { file } => {
            store.import_file(&file)?;
            println!("✅ Imported settings from {}", path_display(&file));
        }
        SettingsCommands::Appearance => {
            let appearance = Appearance::from_settings(&store.load());
            println!("Classes: {}", appearance.classes().join(" "));
            print!("{}", appearance.to_css());
        }
        SettingsCommands::Path => println!("{}", store.path().display()),
    }
    Ok(())
}
