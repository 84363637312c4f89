use crate::core::config::settings::{FontSize, Theme, UserSettings};

/// Light or dark, after `auto` has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorScheme {
    Light,
    Dark,
}

impl ColorScheme {
    pub fn class(self) -> &'static str {
        match self {
            ColorScheme::Light => "light",
            ColorScheme::Dark => "dark",
        }
    }
}

/// Settings reflected into presentation state: root classes plus the custom
/// properties a front end applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appearance {
    pub scheme: ColorScheme,
    pub font_size: FontSize,
    pub primary_color: String,
    pub accent_color: String,
}

impl Appearance {
    /// `system_hint` is consulted only for `Theme::Auto`; no hint means dark.
    pub fn resolve(settings: &UserSettings, system_hint: Option<ColorScheme>) -> Self {
        let scheme = match settings.theme {
            Theme::Light => ColorScheme::Light,
            Theme::Dark => ColorScheme::Dark,
            Theme::Auto => system_hint.unwrap_or(ColorScheme::Dark),
        };
        Self {
            scheme,
            font_size: settings.font_size,
            primary_color: settings.primary_color.clone(),
            accent_color: settings.accent_color.clone(),
        }
    }

    pub fn from_settings(settings: &UserSettings) -> Self {
        let hint = match settings.theme {
            Theme::Auto => detect_preferred_scheme(),
            _ => None,
        };
        Self::resolve(settings, hint)
    }

    pub fn classes(&self) -> Vec<String> {
        vec![
            self.scheme.class().to_string(),
            format!("font-{}", self.font_size.as_str()),
        ]
    }

    pub fn custom_properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("--primary-color", self.primary_color.clone()),
            ("--accent-color", self.accent_color.clone()),
            ("--font-size", format!("{}px", self.font_size.pixels())),
        ]
    }

    pub fn to_css(&self) -> String {
        let mut css = String::from(":root {\n");
        for (name, value) in self.custom_properties() {
            css.push_str(&format!("  {name}: {value};\n"));
        }
        css.push_str("}\n");
        css
    }
}

/// Try to detect the preferred color scheme via the OS app theme preference.
/// Returns None if no hint is available.
pub fn detect_preferred_scheme() -> Option<ColorScheme> {
    #[cfg(target_os = "macos")]
    {
        use std::process::Command;
        // `defaults read -g AppleInterfaceStyle` returns "Dark" when dark mode is on.
        if let Ok(output) = Command::new("/usr/bin/defaults")
            .args(["read", "-g", "AppleInterfaceStyle"])
            .output()
        {
            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if stdout.to_ascii_lowercase().contains("dark") {
                    return Some(ColorScheme::Dark);
                }
            }
        }
        // The key is absent in light mode.
        return Some(ColorScheme::Light);
    }

    #[cfg(target_os = "windows")]
    {
        // HKCU\...\Personalize\AppsUseLightTheme (1 = light, 0 = dark)
        use winreg::enums::HKEY_CURRENT_USER;
        use winreg::RegKey;
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        if let Ok(personalize) =
            hkcu.open_subkey("Software\\Microsoft\\Windows\\CurrentVersion\\Themes\\Personalize")
        {
            let value: Result<u32, _> = personalize.get_value("AppsUseLightTheme");
            if let Ok(v) = value {
                return Some(if v == 0 {
                    ColorScheme::Dark
                } else {
                    ColorScheme::Light
                });
            }
        }
        return None;
    }

    #[cfg(target_os = "linux")]
    {
        use std::process::Command;
        // GNOME 42+: color-scheme is 'prefer-dark' or 'default'
        let output = Command::new("gsettings")
            .args(["get", "org.gnome.desktop.interface", "color-scheme"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout).to_ascii_lowercase();
        if stdout.contains("prefer-dark") {
            Some(ColorScheme::Dark)
        } else if stdout.contains("prefer-light") || stdout.contains("default") {
            Some(ColorScheme::Light)
        } else {
            None
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}
