//! # Boot Configuration
//!
//! Reads the loader's configuration file:
//!
//! ```text
//! [Display]
//! > Width: 1920;
//! > Height: 1080;
//! > BitsPerPixel: 32;
//! [Boot]
//! > Kernel: /AmberOS/System/amberkrn.elf;
//! > LargePages: yes;
//! ```
//!
//! A `[Name]` line opens a section. A setting is `> Name: Value`, ending at
//! `;` or the end of the line; spaces after `>` and `:` are skipped. Any
//! other text is ignored. Lookups return the first match and compare names
//! exactly.
//!
//! Nothing here fails at lookup time: a missing, empty or unparsable value
//! reads as the built-in default.

#![cfg_attr(not(any(test, doctest)), no_std)]

use core::fmt;
use log::warn;

/// Kernel image used when the configuration names none.
pub const DEFAULT_KERNEL_PATH: &str = "/AmberOS/System/amberkrn.elf";

/// Location of the configuration file on the boot volume.
pub const CONFIG_PATH: &str = "/boot/boot.cfg";

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("The configuration is not valid UTF-8 (first bad byte at {valid_up_to})")]
    NotUtf8 { valid_up_to: usize },
}

/// A requested display mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VideoRequest {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
}

impl VideoRequest {
    pub const DEFAULT: Self = Self::new(1024, 768, 32);

    #[must_use]
    pub const fn new(width: u32, height: u32, bits_per_pixel: u32) -> Self {
        Self {
            width,
            height,
            bits_per_pixel,
        }
    }
}

impl Default for VideoRequest {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for VideoRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.bits_per_pixel)
    }
}

/// One `> Name: Value` setting.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Setting<'a> {
    /// Enclosing section; empty before the first section header.
    pub section: &'a str,
    pub name: &'a str,
    pub value: &'a str,
}

/// A parsed view over configuration text. Borrowed, never copied.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootConfig<'a> {
    text: &'a str,
}

impl Default for BootConfig<'static> {
    fn default() -> Self {
        Self { text: "" }
    }
}

impl<'a> BootConfig<'a> {
    #[must_use]
    pub const fn parse(text: &'a str) -> Self {
        Self { text }
    }

    /// Parse raw file bytes. A trailing NUL terminator is tolerated.
    ///
    /// # Errors
    /// [`ConfigError::NotUtf8`] if the bytes are not UTF-8.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, ConfigError> {
        let bytes = bytes.split(|&b| b == 0).next().unwrap_or_default();
        core::str::from_utf8(bytes)
            .map(Self::parse)
            .map_err(|e| ConfigError::NotUtf8 {
                valid_up_to: e.valid_up_to(),
            })
    }

    /// All settings, in file order.
    #[must_use]
    pub fn settings(&self) -> Settings<'a> {
        Settings {
            lines: self.text.lines(),
            section: "",
        }
    }

    /// The raw value of the first `name` setting in `section`.
    #[must_use]
    pub fn find(&self, section: &str, name: &str) -> Option<&'a str> {
        self.settings()
            .find(|s| s.section == section && s.name == name)
            .map(|s| s.value)
    }

    /// The leading decimal digits of a value; `None` when absent or zero.
    #[must_use]
    pub fn number(&self, section: &str, name: &str) -> Option<u32> {
        let value = self.find(section, name)?;
        let digits = value
            .find(|c: char| !c.is_ascii_digit())
            .map_or(value, |end| &value[..end]);
        let parsed = digits.parse::<u32>().ok().filter(|&v| v != 0);
        if parsed.is_none() {
            warn!("[{section}] {name}: ignoring \"{value}\"");
        }
        parsed
    }

    #[must_use]
    pub fn flag(&self, section: &str, name: &str) -> Option<bool> {
        let value = self.find(section, name)?;
        match value {
            v if ["yes", "true", "on", "1"]
                .iter()
                .any(|t| v.eq_ignore_ascii_case(t)) =>
            {
                Some(true)
            }
            v if ["no", "false", "off", "0"]
                .iter()
                .any(|f| v.eq_ignore_ascii_case(f)) =>
            {
                Some(false)
            }
            _ => {
                warn!("[{section}] {name}: ignoring \"{value}\"");
                None
            }
        }
    }

    /// `[Display]` `Width`, `Height` and `BitsPerPixel`, each falling back
    /// to [`VideoRequest::DEFAULT`] on its own.
    #[must_use]
    pub fn video(&self) -> VideoRequest {
        let default = VideoRequest::DEFAULT;
        VideoRequest {
            width: self.number("Display", "Width").unwrap_or(default.width),
            height: self.number("Display", "Height").unwrap_or(default.height),
            bits_per_pixel: self
                .number("Display", "BitsPerPixel")
                .unwrap_or(default.bits_per_pixel),
        }
    }

    /// `[Boot]` `Kernel`, or [`DEFAULT_KERNEL_PATH`].
    #[must_use]
    pub fn kernel_path(&self) -> &'a str {
        match self.find("Boot", "Kernel") {
            Some(path) if !path.is_empty() => path,
            _ => DEFAULT_KERNEL_PATH,
        }
    }

    /// `[Boot]` `LargePages`; off unless set.
    #[must_use]
    pub fn large_pages(&self) -> bool {
        self.flag("Boot", "LargePages").unwrap_or(false)
    }

    /// Copy out everything the loader needs, so the file buffer can be
    /// dropped.
    #[must_use]
    pub fn options(&self) -> BootOptions {
        let kernel = KernelPath::new(self.kernel_path()).unwrap_or_else(|| {
            warn!("[Boot] Kernel: path too long, using {DEFAULT_KERNEL_PATH}");
            KernelPath::default()
        });
        BootOptions {
            video: self.video(),
            kernel,
            large_pages: self.large_pages(),
        }
    }
}

/// Owned copy of the settings the loader acts on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootOptions {
    pub video: VideoRequest,
    pub kernel: KernelPath,
    pub large_pages: bool,
}

impl Default for BootOptions {
    fn default() -> Self {
        BootConfig::default().options()
    }
}

/// ISO 9660 caps paths at 255 bytes.
const MAX_PATH: usize = 255;

/// A kernel path in a fixed buffer.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct KernelPath {
    buf: [u8; MAX_PATH],
    len: u8,
}

impl KernelPath {
    pub const CAPACITY: usize = MAX_PATH;

    /// `None` if `path` does not fit.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(path: &str) -> Option<Self> {
        if path.len() > Self::CAPACITY {
            return None;
        }
        let mut buf = [0; Self::CAPACITY];
        buf[..path.len()].copy_from_slice(path.as_bytes());
        Some(Self {
            buf,
            len: path.len() as u8,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only ever filled from a `&str`.
        core::str::from_utf8(&self.buf[..usize::from(self.len)]).unwrap_or_default()
    }
}

impl Default for KernelPath {
    fn default() -> Self {
        Self::new(DEFAULT_KERNEL_PATH).unwrap_or(Self {
            buf: [0; Self::CAPACITY],
            len: 0,
        })
    }
}

impl fmt::Debug for KernelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for KernelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Iterator returned by [`BootConfig::settings`].
#[derive(Debug, Clone)]
pub struct Settings<'a> {
    lines: core::str::Lines<'a>,
    section: &'a str,
}

impl<'a> Iterator for Settings<'a> {
    type Item = Setting<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for line in self.lines.by_ref() {
            let line = line.trim_start();
            if let Some(rest) = line.strip_prefix('[') {
                if let Some((name, _)) = rest.split_once(']') {
                    self.section = name;
                }
                continue;
            }

            let Some(rest) = line.strip_prefix('>') else {
                continue;
            };
            let Some((name, value)) = rest.trim_start_matches(' ').split_once(':') else {
                continue;
            };
            let value = value.trim_start_matches(' ');
            let value = value.split_once(';').map_or(value, |(v, _)| v);

            return Some(Setting {
                section: self.section,
                name,
                value: value.trim_end(),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
; AmberOS loader configuration
[Display]
> Width: 1920;
> Height:1080
>   BitsPerPixel:   32;  trailing text
[Boot]
> Kernel: /AmberOS/System/test.elf;
> LargePages: Yes;
";

    #[test]
    fn reads_all_settings_in_order() {
        let cfg = BootConfig::parse(SAMPLE);
        let names: Vec<_> = cfg.settings().map(|s| (s.section, s.name, s.value)).collect();
        assert_eq!(
            names,
            [
                ("Display", "Width", "1920"),
                ("Display", "Height", "1080"),
                ("Display", "BitsPerPixel", "32"),
                ("Boot", "Kernel", "/AmberOS/System/test.elf"),
                ("Boot", "LargePages", "Yes"),
            ]
        );
    }

    #[test]
    fn typed_accessors() {
        let cfg = BootConfig::parse(SAMPLE);
        assert_eq!(cfg.video(), VideoRequest::new(1920, 1080, 32));
        assert_eq!(cfg.kernel_path(), "/AmberOS/System/test.elf");
        assert!(cfg.large_pages());
    }

    #[test]
    fn defaults_when_empty() {
        let cfg = BootConfig::default();
        assert_eq!(cfg.video(), VideoRequest::new(1024, 768, 32));
        assert_eq!(cfg.kernel_path(), DEFAULT_KERNEL_PATH);
        assert!(!cfg.large_pages());
    }

    #[test]
    fn malformed_values_fall_back_individually() {
        let cfg = BootConfig::parse("[Display]\n> Width: wide;\n> Height: 0;\n> BitsPerPixel: 24bpp;\n[Boot]\n> Kernel: ;\n> LargePages: maybe;\n");
        assert_eq!(cfg.video(), VideoRequest::new(1024, 768, 24));
        assert_eq!(cfg.kernel_path(), DEFAULT_KERNEL_PATH);
        assert!(!cfg.large_pages());
    }

    #[test]
    fn names_and_sections_match_exactly() {
        let cfg = BootConfig::parse("[display]\n> Width: 800;\n[Display]\n> width: 640;\n> Width: 1280;\n> Width: 1600;\n");
        assert_eq!(cfg.find("Display", "Width"), Some("1280"));
        assert_eq!(cfg.find("display", "Width"), Some("800"));
        assert_eq!(cfg.find("Display", "Widt"), None);
    }

    #[test]
    fn settings_before_any_section() {
        let cfg = BootConfig::parse("> Width: 800\n");
        assert_eq!(cfg.find("", "Width"), Some("800"));
        assert_eq!(cfg.find("Display", "Width"), None);
    }

    #[test]
    fn options_outlive_the_text() {
        let text = String::from("[Boot]\n> Kernel: /k.elf;\n> LargePages: 1;\n");
        let options = BootConfig::parse(&text).options();
        drop(text);
        assert_eq!(options.kernel.as_str(), "/k.elf");
        assert!(options.large_pages);
        assert_eq!(options.video, VideoRequest::DEFAULT);
    }

    #[test]
    fn overlong_kernel_path_falls_back() {
        let text = format!("[Boot]\n> Kernel: /{};\n", "a".repeat(300));
        let options = BootConfig::parse(&text).options();
        assert_eq!(options.kernel.as_str(), DEFAULT_KERNEL_PATH);
        assert_eq!(BootOptions::default().kernel.to_string(), DEFAULT_KERNEL_PATH);
    }

    #[test]
    fn from_bytes_handles_nul_and_bad_utf8() {
        let cfg = BootConfig::from_bytes(b"[Boot]\r\n> LargePages: on;\r\n\0garbage").unwrap();
        assert!(cfg.large_pages());
        assert_eq!(
            BootConfig::from_bytes(b"[Boot]\xFF"),
            Err(ConfigError::NotUtf8 { valid_up_to: 6 })
        );
    }
}
