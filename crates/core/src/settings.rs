//! Configuration persistante du client
//!
//! Fichier TOML dans `$XDG_CONFIG_HOME/il2srs/settings.toml`
//! (typiquement `~/.config/il2srs/settings.toml`). Chaque champ a une valeur
//! par défaut : un fichier partiel est complété, un fichier absent est créé.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{CoreError, CoreResult};
use audio::{AudioConfig, DEFAULT_DEVICE};

/// Dossier de l'application dans le dossier de configuration
pub const APP_DIR_NAME: &str = "il2srs";

/// Nom du fichier de configuration
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Nom de pilote utilisé quand ni le jeu ni la configuration n'en donnent
pub const DEFAULT_PILOT_NAME: &str = "LinuxPilot";

/// Configuration complète du client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub user: UserSettings,
    pub audio: AudioSettings,
    pub keybinds: KeybindSettings,
    pub servers: Vec<ServerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub pilot_name: String,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self { pilot_name: DEFAULT_PILOT_NAME.to_string() }
    }
}

/// Périphériques et gain de sortie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub input_device: String,
    pub output_device: String,
    /// Gain appliqué à la voix reçue, en dB
    pub speaker_boost_db: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            input_device: DEFAULT_DEVICE.to_string(),
            output_device: DEFAULT_DEVICE.to_string(),
            speaker_boost_db: 0.0,
        }
    }
}

/// Touches push-to-talk, noms evdev (`KEY_J`, `BTN_TRIGGER`, ...)
///
/// Une chaîne vide désactive la touche.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeybindSettings {
    pub ptt1: String,
    pub ptt2: String,
}

impl Default for KeybindSettings {
    fn default() -> Self {
        Self {
            ptt1: "KEY_J".to_string(),
            ptt2: "KEY_K".to_string(),
        }
    }
}

/// Serveur SRS connu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub address: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user: UserSettings::default(),
            audio: AudioSettings::default(),
            keybinds: KeybindSettings::default(),
            servers: vec![
                ServerEntry {
                    name: "local host".to_string(),
                    address: "127.0.0.1:6002".to_string(),
                },
                ServerEntry {
                    name: "Example Server".to_string(),
                    address: "127.0.0.1:6002".to_string(),
                },
            ],
        }
    }
}

impl Settings {
    /// Chemin du fichier de configuration de l'utilisateur
    ///
    /// None si le dossier de configuration ne peut pas être déterminé.
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
    }

    /// Charge la configuration de l'utilisateur
    ///
    /// N'échoue jamais : en cas de problème, log et valeurs par défaut.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_or_default(&path),
            None => {
                tracing::warn!("Dossier de configuration introuvable, valeurs par défaut");
                Self::default()
            }
        }
    }

    /// Charge depuis `path`, en créant le fichier s'il est absent
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Fichier de configuration absent, création");
            let defaults = Self::default();
            if let Err(e) = defaults.save_to(path) {
                tracing::error!(path = %path.display(), error = %e, "Impossible d'écrire la configuration par défaut");
            }
            return defaults;
        }

        match Self::load_from(path) {
            Ok(settings) => {
                tracing::info!(path = %path.display(), "Configuration chargée");
                settings
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Configuration illisible, valeurs par défaut");
                Self::default()
            }
        }
    }

    /// Lit et parse un fichier de configuration
    pub fn load_from(path: &Path) -> CoreResult<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Enregistre la configuration de l'utilisateur
    pub fn save(&self) -> CoreResult<()> {
        let path = Self::settings_path().ok_or(CoreError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Enregistre dans `path`, en créant le dossier parent
    pub fn save_to(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Configuration audio dérivée des réglages utilisateur
    pub fn audio_config(&self) -> AudioConfig {
        AudioConfig::with_devices(
            &self.audio.input_device,
            &self.audio.output_device,
            self.audio.speaker_boost_db,
        )
    }

    /// Nom de pilote à annoncer : celui du jeu, sinon celui de la configuration
    pub fn resolve_pilot_name(&self, from_game: Option<&str>) -> String {
        [from_game, Some(self.user.pilot_name.as_str())]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
            .unwrap_or(DEFAULT_PILOT_NAME)
            .to_string()
    }
}
