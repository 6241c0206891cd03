//! Process-wide configuration, merged once from an optional `Settings.toml`
//! and `D3D9_`-prefixed environment variables. Grounded on the
//! `config::Config` + `config::Environment::with_prefix` idiom used for
//! window/runtime settings elsewhere in the pack.

use lazy_static::lazy_static;

lazy_static! {
    static ref SETTINGS: Settings = Settings::load();
}

/// The four boolean switches the device runtime consults outside of the
/// normal LegacyGfx call surface.
pub struct Settings {
    /// Enables the D3D11 debug layer on device creation.
    pub debug: bool,
    /// Hides the cursor as soon as the device is created, before the
    /// first `ShowCursor` call.
    pub initial_hide_cursor: bool,
    /// Dumps every translated shader's bytecode to `shaderdump/`.
    pub shader_dump: bool,
    /// Clears unbound render targets to a random colour instead of black,
    /// to make missing-clear bugs in calling applications obvious.
    pub random_clear_colour: bool,
}

impl Settings {
    fn load() -> Self {
        let mut cfg = config::Config::new();

        if let Err(err) = cfg.merge(config::File::with_name("Settings").required(false)) {
            log::warn!("failed to read Settings.toml, using defaults: {}", err);
        }

        if let Err(err) = cfg.merge(config::Environment::with_prefix("D3D9")) {
            log::warn!("failed to read D3D9_* environment overrides: {}", err);
        }

        Settings {
            debug: cfg.get_bool("debug").unwrap_or(false),
            initial_hide_cursor: cfg.get_bool("initial_hide_cursor").unwrap_or(false),
            shader_dump: cfg.get_bool("shader_dump").unwrap_or(false),
            random_clear_colour: cfg.get_bool("random_clear_colour").unwrap_or(false),
        }
    }
}

pub fn settings() -> &'static Settings {
    &SETTINGS
}
