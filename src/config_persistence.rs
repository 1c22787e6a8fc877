use std::path::Path;

use log::warn;
use toml_edit::{value, Array, DocumentMut, Item, Table};

use crate::config::Config;

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn set_table_scalar_if_changed<T, F>(
    table: &mut Table,
    key: &str,
    previous_value: T,
    next_value: T,
    to_item: F,
) where
    T: PartialEq + Copy,
    F: FnOnce(T) -> Item,
{
    if table.contains_key(key) && previous_value == next_value {
        return;
    }
    set_table_value_preserving_decor(table, key, to_item(next_value));
}

fn set_table_string_if_changed(table: &mut Table, key: &str, previous: &str, next: &str) {
    if table.contains_key(key) && previous == next {
        return;
    }
    set_table_value_preserving_decor(table, key, value(next));
}

fn ensure_section_table<'a>(document: &'a mut DocumentMut, key: &str) -> &'a mut Table {
    let root = document.as_table_mut();
    let should_replace = !matches!(root.get(key), Some(item) if item.is_table());
    if should_replace {
        root.insert(key, Item::Table(Table::new()));
    }
    root[key]
        .as_table_mut()
        .expect("config section should be a table")
}

fn write_config_to_document(document: &mut DocumentMut, previous: &Config, config: &Config) {
    {
        let player = ensure_section_table(document, "player");
        set_table_scalar_if_changed(
            player,
            "volume",
            i64::from(previous.player.volume),
            i64::from(config.player.volume),
            value,
        );
        set_table_scalar_if_changed(
            player,
            "sound_enabled",
            previous.player.sound_enabled,
            config.player.sound_enabled,
            value,
        );
    }

    {
        let title_lookup = ensure_section_table(document, "title_lookup");
        set_table_scalar_if_changed(
            title_lookup,
            "enabled",
            previous.title_lookup.enabled,
            config.title_lookup.enabled,
            value,
        );
        set_table_string_if_changed(
            title_lookup,
            "api_key",
            &previous.title_lookup.api_key,
            &config.title_lookup.api_key,
        );
        set_table_string_if_changed(
            title_lookup,
            "endpoint",
            &previous.title_lookup.endpoint,
            &config.title_lookup.endpoint,
        );
        set_table_scalar_if_changed(
            title_lookup,
            "timeout_secs",
            previous.title_lookup.timeout_secs as i64,
            config.title_lookup.timeout_secs as i64,
            value,
        );
    }

    {
        let storage = ensure_section_table(document, "storage");
        set_table_string_if_changed(
            storage,
            "database_file",
            &previous.storage.database_file,
            &config.storage.database_file,
        );
    }

    {
        let headless = ensure_section_table(document, "headless");
        set_table_scalar_if_changed(
            headless,
            "track_duration_secs",
            previous.headless.track_duration_secs as i64,
            config.headless.track_duration_secs as i64,
            value,
        );
        set_table_scalar_if_changed(
            headless,
            "load_latency_ms",
            previous.headless.load_latency_ms as i64,
            config.headless.load_latency_ms as i64,
            value,
        );
        set_table_scalar_if_changed(
            headless,
            "host_api_latency_ms",
            previous.headless.host_api_latency_ms as i64,
            config.headless.host_api_latency_ms as i64,
            value,
        );
        if !headless.contains_key("unavailable_ids")
            || previous.headless.unavailable_ids != config.headless.unavailable_ids
        {
            let mut ids = Array::new();
            for id in &config.headless.unavailable_ids {
                ids.push(id.as_str());
            }
            set_table_value_preserving_decor(headless, "unavailable_ids", value(ids));
        }
    }
}

/// Rewrites `existing_text` with values from `config`, keeping comments and
/// formatting of untouched keys.
pub fn serialize_config_with_preserved_comments(
    existing_text: &str,
    config: &Config,
) -> Result<String, String> {
    let previous = toml::from_str::<Config>(existing_text)
        .map_err(|err| format!("failed to parse existing config as Config: {}", err))?;
    let mut document = existing_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse existing config as TOML document: {}", err))?;
    write_config_to_document(&mut document, &previous, config);
    Ok(document.to_string())
}

/// Writes `config` to `path`, editing the existing file in place.
///
/// An existing file that no longer parses is left untouched so hand-edited
/// settings are never replaced by in-memory defaults.
pub fn persist_config_file(config: &Config, path: &Path) {
    let existing_text = std::fs::read_to_string(path).ok();
    let config_text = if let Some(existing_text) = existing_text {
        match serialize_config_with_preserved_comments(&existing_text, config) {
            Ok(updated_text) => Some(updated_text),
            Err(err) => {
                warn!(
                    "Existing config {} could not be parsed ({}). Leaving it untouched.",
                    path.display(),
                    err
                );
                return;
            }
        }
    } else {
        toml::to_string(config).ok()
    };
    let Some(config_text) = config_text else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };
    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}
