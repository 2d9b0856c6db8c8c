// SPDX-License-Identifier: GPL-3.0-only

//! Parsers for the tool's configuration output
//!
//! `--get-config <key>` prints key/value lines:
//!
//! ```text
//! Label: ISO Speed
//! Readonly: 0
//! Type: RADIO
//! Current: 100
//! Choice: 0 Auto
//! Choice: 1 100
//! END
//! ```

use crate::backends::camera::types::SettingDescriptor;

/// Parse `--get-config` output into a descriptor for `name`
pub fn parse_get_config(name: &str, output: &str) -> SettingDescriptor {
    let mut descriptor = SettingDescriptor {
        name: name.to_string(),
        ..Default::default()
    };

    for line in output.lines() {
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match field.trim() {
            "Label" => descriptor.label = Some(value.to_string()),
            "Current" => descriptor.current = Some(value.to_string()),
            // "Choice: <index> <value>"; the value itself may contain spaces
            "Choice" => {
                let choice = match value.split_once(char::is_whitespace) {
                    Some((index, rest)) if index.parse::<u32>().is_ok() => rest.trim(),
                    _ => value,
                };
                if !choice.is_empty() {
                    descriptor.choices.push(choice.to_string());
                }
            }
            _ => {}
        }
    }

    descriptor
}

/// First `limit` keys from `--list-config` output
pub fn parse_config_list(output: &str, limit: usize) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('/'))
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// Interpret the capture-mode toggle: `0` is manual (PTP), anything else PC-remote
pub fn is_manual_capture_mode(descriptor: &SettingDescriptor) -> bool {
    descriptor.current.as_deref().map(str::trim) == Some("0")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISO_OUTPUT: &str = "Label: ISO Speed\n\
        Readonly: 0\n\
        Type: RADIO\n\
        Current: 400\n\
        Choice: 0 Auto\n\
        Choice: 1 100\n\
        Choice: 2 200\n\
        Choice: 3 400\n\
        END\n";

    #[test]
    fn test_parse_radio_setting() {
        let descriptor = parse_get_config("iso", ISO_OUTPUT);
        assert_eq!(descriptor.name, "iso");
        assert_eq!(descriptor.label.as_deref(), Some("ISO Speed"));
        assert_eq!(descriptor.current.as_deref(), Some("400"));
        assert_eq!(descriptor.choices, vec!["Auto", "100", "200", "400"]);
    }

    #[test]
    fn test_choice_values_keep_spaces_and_colons() {
        let output = "Current: 1/60\nChoice: 0 1/4000\nChoice: 1 bulb mode\nChoice: 2 0:30\n";
        let descriptor = parse_get_config("shutterspeed", output);
        assert_eq!(descriptor.choices, vec!["1/4000", "bulb mode", "0:30"]);
    }

    #[test]
    fn test_parse_empty_output() {
        let descriptor = parse_get_config("aperture", "");
        assert_eq!(descriptor.current, None);
        assert!(descriptor.choices.is_empty());
    }

    #[test]
    fn test_parse_config_list_limits_and_filters() {
        let output = "/main/actions/syncdatetime\n/main/imgsettings/iso\n\nnoise\n/main/capturesettings/aperture\n";
        assert_eq!(
            parse_config_list(output, 2),
            vec!["/main/actions/syncdatetime", "/main/imgsettings/iso"]
        );
        assert_eq!(parse_config_list(output, 10).len(), 3);
    }

    #[test]
    fn test_manual_capture_mode() {
        let manual = parse_get_config("capture", "Type: TOGGLE\nCurrent: 0\n");
        let remote = parse_get_config("capture", "Type: TOGGLE\nCurrent: 1\n");
        assert!(is_manual_capture_mode(&manual));
        assert!(!is_manual_capture_mode(&remote));
        assert!(!is_manual_capture_mode(&SettingDescriptor::default()));
    }
}
