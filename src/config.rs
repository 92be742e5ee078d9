use crate::error::ConfigError;
use crate::flash::WORD_SIZE;
use crate::report::REPORT_SIZE;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Device settings, read from TOML. Every field has a default, so an empty
/// file is a valid config.
///
/// ```toml
/// [engine]
/// tick_interval_us = 1000
///
/// [flash]
/// image = "script.bin"
///
/// [jiggler]
/// width = 20
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub engine: EngineConfig,
    pub flash: FlashConfig,
    pub console: ConsoleConfig,
    pub jiggler: JigglerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub tick_interval_us: u64,
    pub emit_retry_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tick_interval_us: 1000,
            emit_retry_limit: 100_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FlashConfig {
    pub base_address: u32,
    pub page_size: usize,
    pub pages: usize,
    pub image: Option<PathBuf>,
}

impl Default for FlashConfig {
    fn default() -> Self {
        // last 1K page of a 128K STM32F103
        FlashConfig {
            base_address: 0x0801_fc00,
            page_size: 1024,
            pages: 1,
            image: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleConfig {
    pub prompt: String,
    pub line_capacity: usize,
    pub packet_size: usize,
    pub send_retry_limit: u32,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            prompt: "hid> ".to_string(),
            line_capacity: 2048,
            packet_size: 64,
            send_retry_limit: 100_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct JigglerConfig {
    pub width: usize,
}

impl Default for JigglerConfig {
    fn default() -> Self {
        JigglerConfig { width: 30 }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Config::from_toml(&fs::read_to_string(path)?)
    }

    /// the script region is the page holding `base_address`, from there to the page end
    pub fn region_capacity(&self) -> usize {
        let page_size = self.flash.page_size.max(1);
        page_size - self.flash.base_address as usize % page_size
    }

    /// start of the page holding `base_address`, where the medium begins
    pub fn medium_base(&self) -> u32 {
        let page_size = u32::try_from(self.flash.page_size.max(1)).unwrap_or(u32::MAX);
        self.flash.base_address - self.flash.base_address % page_size
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let f = &self.flash;
        if f.page_size == 0 || f.page_size % WORD_SIZE != 0 {
            return invalid(format!(
                "flash.page_size {} must be a non-zero multiple of {}",
                f.page_size, WORD_SIZE
            ));
        }
        if u32::try_from(f.page_size).is_err() {
            return invalid(format!(
                "flash.page_size {} does not fit a 32-bit address",
                f.page_size
            ));
        }
        if f.pages == 0 {
            return invalid("flash.pages must be at least 1".to_string());
        }
        let medium_end = f
            .page_size
            .checked_mul(f.pages)
            .and_then(|len| u64::try_from(len).ok())
            .and_then(|len| len.checked_add(u64::from(self.medium_base())));
        if medium_end.map_or(true, |end| end > 1 << 32) {
            return invalid(format!(
                "{} pages of {} bytes do not fit the 32-bit address space",
                f.pages, f.page_size
            ));
        }
        if f.base_address as usize % WORD_SIZE != 0 {
            return invalid(format!(
                "flash.base_address {:#010x} is not word aligned",
                f.base_address
            ));
        }
        if self.console.line_capacity == 0 {
            return invalid("console.line_capacity must be at least 1".to_string());
        }
        if self.console.packet_size == 0 {
            return invalid("console.packet_size must be at least 1".to_string());
        }
        if self.engine.tick_interval_us == 0 {
            return invalid("engine.tick_interval_us must be at least 1".to_string());
        }
        let jiggler_bytes = self
            .jiggler
            .width
            .checked_mul(2)
            .and_then(|n| n.checked_add(1))
            .and_then(|n| n.checked_mul(REPORT_SIZE));
        if jiggler_bytes.map_or(true, |len| len > self.region_capacity()) {
            return invalid(format!(
                "jiggler.width {} does not fit the {}-byte script region",
                self.jiggler.width,
                self.region_capacity()
            ));
        }
        Ok(())
    }
}
