//! Device settings
//!
//! Eleven text settings plus the `configSalva` flag, persisted through a
//! [`SettingsStore`]. Until a configuration has been saved explicitly, every
//! load restores the factory defaults first.
//!
//! # Wire names
//! Settings travel as JSON with camelCase keys (`ipServidor`, `inicioZona1`).
//! Incoming bodies may also use the hyphenated form (`ip-servidor`,
//! `inicio-zona-1`) understood by older configuration pages.

use core::num::NonZeroU16;

use serde::{Deserialize, Serialize};

use super::storage::{SettingsStore, StoreError};

/// Longest accepted setting value, in bytes
pub const MAX_VALUE_LEN: usize = 64;

pub type SettingValue = heapless::String<MAX_VALUE_LEN>;

/// Persisted setting names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SettingKey {
    Ssid = 0,
    Password = 1,
    ServerIp = 2,
    ServerPort = 3,
    Token = 4,
    Zone1Begin = 5,
    Zone1End = 6,
    Zone2Begin = 7,
    Zone2End = 8,
    Zone3Begin = 9,
    Zone3End = 10,
    ConfigSaved = 11,
}

impl SettingKey {
    /// The text settings, in the order they are reported
    pub const TEXT: [SettingKey; 11] = [
        SettingKey::Ssid,
        SettingKey::Password,
        SettingKey::ServerIp,
        SettingKey::ServerPort,
        SettingKey::Token,
        SettingKey::Zone1Begin,
        SettingKey::Zone1End,
        SettingKey::Zone2Begin,
        SettingKey::Zone2End,
        SettingKey::Zone3Begin,
        SettingKey::Zone3End,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            11 => Some(SettingKey::ConfigSaved),
            id => SettingKey::TEXT.get(id as usize).copied(),
        }
    }

    /// Name used in storage and in JSON responses
    pub const fn name(self) -> &'static str {
        match self {
            SettingKey::Ssid => "ssid",
            SettingKey::Password => "senha",
            SettingKey::ServerIp => "ipServidor",
            SettingKey::ServerPort => "portaServidor",
            SettingKey::Token => "token",
            SettingKey::Zone1Begin => "inicioZona1",
            SettingKey::Zone1End => "fimZona1",
            SettingKey::Zone2Begin => "inicioZona2",
            SettingKey::Zone2End => "fimZona2",
            SettingKey::Zone3Begin => "inicioZona3",
            SettingKey::Zone3End => "fimZona3",
            SettingKey::ConfigSaved => "configSalva",
        }
    }

    /// Hyphenated spelling accepted in request bodies
    pub const fn alias(self) -> &'static str {
        match self {
            SettingKey::ServerIp => "ip-servidor",
            SettingKey::ServerPort => "porta-servidor",
            SettingKey::Zone1Begin => "inicio-zona-1",
            SettingKey::Zone1End => "fim-zona-1",
            SettingKey::Zone2Begin => "inicio-zona-2",
            SettingKey::Zone2End => "fim-zona-2",
            SettingKey::Zone3Begin => "inicio-zona-3",
            SettingKey::Zone3End => "fim-zona-3",
            other => other.name(),
        }
    }

    /// Look a key up by its name or its hyphenated alias
    pub fn from_name(name: &str) -> Option<Self> {
        SettingKey::TEXT
            .into_iter()
            .chain([SettingKey::ConfigSaved])
            .find(|key| key.name() == name || key.alias() == name)
    }

    /// Factory value restored by a reset. `configSalva` has no text default.
    pub const fn default_text(self) -> &'static str {
        match self {
            SettingKey::Ssid => "CLARO_D4D094",
            SettingKey::Password => "NYJmv24gGv",
            SettingKey::ServerIp => "192.168.1.1",
            SettingKey::ServerPort => "8080",
            SettingKey::Token => "default_token",
            SettingKey::Zone1Begin => "10",
            SettingKey::Zone1End => "20",
            SettingKey::Zone2Begin => "20",
            SettingKey::Zone2End => "30",
            SettingKey::Zone3Begin => "30",
            SettingKey::Zone3End => "40",
            SettingKey::ConfigSaved => "",
        }
    }
}

/// The full set of text settings.
///
/// Missing fields deserialize as empty strings, matching what a partial
/// save stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ssid: SettingValue,
    #[serde(rename = "senha")]
    pub password: SettingValue,
    #[serde(rename = "ipServidor", alias = "ip-servidor")]
    pub server_ip: SettingValue,
    #[serde(rename = "portaServidor", alias = "porta-servidor")]
    pub server_port: SettingValue,
    pub token: SettingValue,
    #[serde(rename = "inicioZona1", alias = "inicio-zona-1")]
    pub zone1_begin: SettingValue,
    #[serde(rename = "fimZona1", alias = "fim-zona-1")]
    pub zone1_end: SettingValue,
    #[serde(rename = "inicioZona2", alias = "inicio-zona-2")]
    pub zone2_begin: SettingValue,
    #[serde(rename = "fimZona2", alias = "fim-zona-2")]
    pub zone2_end: SettingValue,
    #[serde(rename = "inicioZona3", alias = "inicio-zona-3")]
    pub zone3_begin: SettingValue,
    #[serde(rename = "fimZona3", alias = "fim-zona-3")]
    pub zone3_end: SettingValue,
}

impl Settings {
    /// Factory defaults
    pub fn defaults() -> Self {
        let mut settings = Self::default();
        for key in SettingKey::TEXT {
            if let Some(field) = settings.field_mut(key) {
                // every default is far shorter than MAX_VALUE_LEN
                let _ = field.push_str(key.default_text());
            }
        }
        settings
    }

    /// Text value of `key`, empty for `configSalva`
    pub fn get(&self, key: SettingKey) -> &str {
        match key {
            SettingKey::Ssid => self.ssid.as_str(),
            SettingKey::Password => self.password.as_str(),
            SettingKey::ServerIp => self.server_ip.as_str(),
            SettingKey::ServerPort => self.server_port.as_str(),
            SettingKey::Token => self.token.as_str(),
            SettingKey::Zone1Begin => self.zone1_begin.as_str(),
            SettingKey::Zone1End => self.zone1_end.as_str(),
            SettingKey::Zone2Begin => self.zone2_begin.as_str(),
            SettingKey::Zone2End => self.zone2_end.as_str(),
            SettingKey::Zone3Begin => self.zone3_begin.as_str(),
            SettingKey::Zone3End => self.zone3_end.as_str(),
            SettingKey::ConfigSaved => "",
        }
    }

    /// Mutable access to a text field, `None` for `configSalva`
    pub fn field_mut(&mut self, key: SettingKey) -> Option<&mut SettingValue> {
        let field = match key {
            SettingKey::Ssid => &mut self.ssid,
            SettingKey::Password => &mut self.password,
            SettingKey::ServerIp => &mut self.server_ip,
            SettingKey::ServerPort => &mut self.server_port,
            SettingKey::Token => &mut self.token,
            SettingKey::Zone1Begin => &mut self.zone1_begin,
            SettingKey::Zone1End => &mut self.zone1_end,
            SettingKey::Zone2Begin => &mut self.zone2_begin,
            SettingKey::Zone2End => &mut self.zone2_end,
            SettingKey::Zone3Begin => &mut self.zone3_begin,
            SettingKey::Zone3End => &mut self.zone3_end,
            SettingKey::ConfigSaved => return None,
        };
        Some(field)
    }

    /// Read all settings, restoring the defaults first unless a
    /// configuration was saved
    pub async fn load<S: SettingsStore>(store: &mut S) -> Result<Self, StoreError> {
        if !store.get_bool(SettingKey::ConfigSaved, false).await? {
            info!("no saved configuration, restoring defaults");
            Self::restore_defaults(store).await?;
        }

        let mut settings = Self::default();
        for key in SettingKey::TEXT {
            let value = store.get_string(key, key.default_text()).await?;
            if let Some(field) = settings.field_mut(key) {
                *field = value;
            }
        }
        Ok(settings)
    }

    /// Persist every value verbatim and mark the configuration as saved
    pub async fn save<S: SettingsStore>(&self, store: &mut S) -> Result<(), StoreError> {
        for key in SettingKey::TEXT {
            store.put_string(key, self.get(key)).await?;
        }
        store.put_bool(SettingKey::ConfigSaved, true).await?;
        info!("configuration saved");
        Ok(())
    }

    /// Write the factory defaults and clear `configSalva`
    pub async fn restore_defaults<S: SettingsStore>(store: &mut S) -> Result<Self, StoreError> {
        let defaults = Self::defaults();
        for key in SettingKey::TEXT {
            store.put_string(key, defaults.get(key)).await?;
        }
        store.put_bool(SettingKey::ConfigSaved, false).await?;
        Ok(defaults)
    }

    /// Station credentials, `None` when no SSID is configured
    pub fn wifi_credentials(&self) -> Option<(&str, &str)> {
        if self.ssid.is_empty() {
            None
        } else {
            Some((self.ssid.as_str(), self.password.as_str()))
        }
    }

    /// Zone bounds parsed from the six zone settings
    pub fn zones(&self) -> ZoneThresholds {
        ZoneThresholds::from_settings(self)
    }
}

/// A half-open distance band `[begin, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Zone {
    pub begin: u16,
    pub end: u16,
}

impl Zone {
    pub fn contains(&self, distance: u16) -> bool {
        self.begin <= distance && distance < self.end
    }
}

/// Distance bands configured through `inicioZonaN` / `fimZonaN`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ZoneThresholds {
    pub zones: [Zone; 3],
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self::from_settings(&Settings::defaults())
    }
}

impl ZoneThresholds {
    const BOUNDS: [(SettingKey, SettingKey); 3] = [
        (SettingKey::Zone1Begin, SettingKey::Zone1End),
        (SettingKey::Zone2Begin, SettingKey::Zone2End),
        (SettingKey::Zone3Begin, SettingKey::Zone3End),
    ];

    /// Parse the zone bounds. A bound that is not a number falls back to its default.
    pub fn from_settings(settings: &Settings) -> Self {
        let bound = |key: SettingKey| -> u16 {
            settings.get(key).trim().parse().unwrap_or_else(|_| {
                warn!("setting {} is not a distance, using default", key.name());
                // defaults are numeric literals
                key.default_text().parse().unwrap_or(0)
            })
        };

        let zones = Self::BOUNDS.map(|(begin, end)| Zone {
            begin: bound(begin),
            end: bound(end),
        });
        Self { zones }
    }

    /// 1-based number of the first zone containing `distance`
    pub fn zone_for(&self, distance: u16) -> Option<usize> {
        self.zones
            .iter()
            .position(|zone| zone.contains(distance))
            .map(|index| index + 1)
    }
}

/// Divisor applied by consumers that report distance in a coarser unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleDivisor(NonZeroU16);

impl ScaleDivisor {
    pub const fn new(divisor: NonZeroU16) -> Self {
        Self(divisor)
    }

    pub const fn get(self) -> u16 {
        self.0.get()
    }

    pub const fn scaled(self, distance: u16) -> u16 {
        distance / self.0.get()
    }
}

impl Default for ScaleDivisor {
    fn default() -> Self {
        Self(NonZeroU16::MIN)
    }
}
