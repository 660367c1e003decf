//! Local slash commands typed on the device.

use crate::palette::C64Color;

/// Display settings the device user can change without involving the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSettings {
    pub border_color: C64Color,
    pub show_reasoning: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            border_color: C64Color::LightBlue,
            show_reasoning: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    /// Not a local command; send the line to the host unchanged.
    Forward(String),
    /// Handled on the device. `reply` is shown as a system line.
    Handled { reply: String },
}

pub const COLOR_USAGE: &str = "USAGE: /COLOR <NAME>";

/// `Some(argument)` for `/color` on its own or followed by a space.
fn color_argument(input: &str) -> Option<&str> {
    if input == "/color" {
        return Some("");
    }
    input.strip_prefix("/color ")
}

/// Decide what to do with a submitted line.
///
/// Only `/color [<name>]` and `/thinking` are local. Matching is exact and
/// case-sensitive, so `/COLOR red` or `/thinking on` go to the host like any
/// other text.
pub fn interpret(input: &str, settings: &mut DeviceSettings) -> Interpretation {
    if input == "/thinking" {
        settings.show_reasoning = !settings.show_reasoning;
        let reply = if settings.show_reasoning {
            "THINKING DISPLAY ON"
        } else {
            "THINKING DISPLAY OFF"
        };
        return Interpretation::Handled {
            reply: reply.to_string(),
        };
    }

    if let Some(argument) = color_argument(input) {
        let name = argument.trim();
        if name.is_empty() {
            return Interpretation::Handled {
                reply: COLOR_USAGE.to_string(),
            };
        }
        let reply = match C64Color::from_name(name) {
            Some(color) => {
                settings.border_color = color;
                format!("BORDER COLOR SET TO {}", color.name().to_uppercase())
            }
            None => format!("UNKNOWN COLOR: {}", name.to_uppercase()),
        };
        return Interpretation::Handled { reply };
    }

    Interpretation::Forward(input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_command_sets_border() {
        let mut settings = DeviceSettings::default();
        let result = interpret("/color red", &mut settings);
        assert_eq!(
            result,
            Interpretation::Handled {
                reply: "BORDER COLOR SET TO RED".to_string()
            }
        );
        assert_eq!(settings.border_color, C64Color::Red);
    }

    #[test]
    fn test_unknown_color_leaves_border() {
        let mut settings = DeviceSettings::default();
        let result = interpret("/color mauve", &mut settings);
        assert_eq!(
            result,
            Interpretation::Handled {
                reply: "UNKNOWN COLOR: MAUVE".to_string()
            }
        );
        assert_eq!(settings.border_color, C64Color::LightBlue);
    }

    #[test]
    fn test_color_without_name_shows_usage() {
        let mut settings = DeviceSettings::default();
        for line in ["/color", "/color ", "/color    "] {
            assert_eq!(
                interpret(line, &mut settings),
                Interpretation::Handled {
                    reply: COLOR_USAGE.to_string()
                }
            );
        }
        assert_eq!(settings, DeviceSettings::default());
    }

    #[test]
    fn test_thinking_toggles() {
        let mut settings = DeviceSettings::default();
        assert!(settings.show_reasoning);
        assert_eq!(
            interpret("/thinking", &mut settings),
            Interpretation::Handled {
                reply: "THINKING DISPLAY OFF".to_string()
            }
        );
        assert!(!settings.show_reasoning);
        interpret("/thinking", &mut settings);
        assert!(settings.show_reasoning);
    }

    #[test]
    fn test_other_lines_are_forwarded() {
        let mut settings = DeviceSettings::default();
        for line in ["HELLO", "/reset", "/COLOR red", "/thinking now", "/colorred"] {
            assert_eq!(
                interpret(line, &mut settings),
                Interpretation::Forward(line.to_string())
            );
        }
        assert_eq!(settings, DeviceSettings::default());
    }
}
