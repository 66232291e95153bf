// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Colours used for interactive output.
//!
//! A [`Palette`] is built once from the `color` section of the configuration
//! and passed by reference to whatever prints. Each style is written as
//! `"<fg> <bg> <bold>"`; `normal` in any position leaves that attribute
//! unset and unknown colour names are ignored.

use colored::{Color, ColoredString, Colorize};

use crate::config::ColorSection;

/// What a piece of interactive output is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    ExecInfo,
    NavFile,
    NavTitle,
    NavContext,
    NavInput,
}

/// Whether colour escapes are emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorMode {
    /// Leave the decision to `colored`'s environment detection. Also what
    /// `auto` and an unset `ui` select.
    #[default]
    Detect,
    Always,
    Never,
}

impl ColorMode {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("true" | "always") => ColorMode::Always,
            Some("false" | "never") => ColorMode::Never,
            _ => ColorMode::Detect,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Style {
    fg: Option<Color>,
    bg: Option<Color>,
    bold: bool,
}

impl Style {
    /// Parses `text`, falling back to `default` when `text` is blank.
    pub fn parse(text: &str, default: &str) -> Self {
        let text = if text.trim().is_empty() { default } else { text };
        let mut fields = text.split_whitespace().map(str::to_ascii_lowercase);
        Style {
            fg: fields.next().as_deref().and_then(color_named),
            bg: fields.next().as_deref().and_then(color_named),
            bold: fields.next().as_deref() == Some("bold"),
        }
    }

    pub fn is_plain(&self) -> bool {
        self.fg.is_none() && self.bg.is_none() && !self.bold
    }

    fn apply(&self, text: &str) -> ColoredString {
        let mut painted = ColoredString::from(text);
        if let Some(fg) = self.fg {
            painted = painted.color(fg);
        }
        if let Some(bg) = self.bg {
            painted = painted.on_color(bg);
        }
        if self.bold {
            painted = painted.bold();
        }
        painted
    }
}

fn color_named(name: &str) -> Option<Color> {
    let color = match name {
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "white" => Color::White,
        "black" => Color::Black,
        _ => return None,
    };
    Some(color)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    mode: ColorMode,
    exec_info: Style,
    nav_file: Style,
    nav_title: Style,
    nav_context: Style,
    nav_input: Style,
}

impl Default for Palette {
    fn default() -> Self {
        Palette::from_config(&ColorSection::default())
    }
}

impl Palette {
    pub fn from_config(colors: &ColorSection) -> Self {
        Palette {
            mode: ColorMode::parse(colors.ui.as_deref()),
            exec_info: Style::parse(&colors.exec.file, ""),
            nav_file: Style::parse(&colors.nav.file, "cyan"),
            nav_title: Style::parse(&colors.nav.title, "yellow"),
            nav_context: Style::parse(&colors.nav.context, ""),
            nav_input: Style::parse(&colors.nav.input, "normal normal bold"),
        }
    }

    /// A palette that never emits escapes.
    pub fn plain() -> Self {
        Palette {
            mode: ColorMode::Never,
            ..Palette::default()
        }
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    pub fn style(&self, role: Role) -> &Style {
        match role {
            Role::ExecInfo => &self.exec_info,
            Role::NavFile => &self.nav_file,
            Role::NavTitle => &self.nav_title,
            Role::NavContext => &self.nav_context,
            Role::NavInput => &self.nav_input,
        }
    }

    /// Pushes a forced mode into `colored`'s process-wide switch. Call once
    /// before printing.
    pub fn install(&self) {
        match self.mode {
            ColorMode::Always => colored::control::set_override(true),
            ColorMode::Never => colored::control::set_override(false),
            ColorMode::Detect => {}
        }
    }

    pub fn paint(&self, role: Role, text: &str) -> String {
        let style = self.style(role);
        if self.mode == ColorMode::Never || style.is_plain() {
            return text.to_string();
        }
        style.apply(text).to_string()
    }
}
