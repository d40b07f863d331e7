//! Decision grammar – free text in, [`ActionCommand`] out.
//!
//! The decision service replies with a single line of `NAME` or
//! `NAME:ARGS`. [`decode`] turns that into the closed [`ActionCommand`]
//! enum; everything downstream handles actions by exhaustive match instead
//! of string prefix checks.
//!
//! Anything unrecognized decodes to [`ActionCommand::Unknown`] with the raw
//! text preserved. Empty input decodes to the fail-safe
//! `Wait(5)` – the system-wide default whenever no decision is available.

use cellwarden_types::{ActionCommand, RadioTech};

/// Fallback pause, in minutes, when no decision is available.
pub const DEFAULT_WAIT_MINUTES: u32 = 5;

/// Decode one decision reply. Case-insensitive on the action name,
/// leading/trailing whitespace trimmed. Never fails: the worst input maps
/// to `Unknown`, the empty input to the `Wait` fail-safe.
pub fn decode(text: &str) -> ActionCommand {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ActionCommand::Wait {
            minutes: DEFAULT_WAIT_MINUTES,
        };
    }

    let (name, args) = match trimmed.split_once(':') {
        Some((n, a)) => (n.trim().to_uppercase(), Some(a.trim())),
        None => (trimmed.to_uppercase(), None),
    };

    let unknown = || ActionCommand::Unknown {
        raw: trimmed.to_string(),
    };

    match (name.as_str(), args) {
        // WAIT is the fail-safe and must be maximally accepting: a missing
        // or malformed minute count falls back to the default.
        ("WAIT", args) => ActionCommand::Wait {
            minutes: args
                .and_then(|a| a.parse().ok())
                .unwrap_or(DEFAULT_WAIT_MINUTES),
        },
        ("RESTART_MODEM", None) => ActionCommand::RestartModem,
        ("RESET_BANDS", None) => ActionCommand::ResetBands,
        ("FULL_SCAN", None) => ActionCommand::FullScan,
        ("SET_LTE_BANDS", Some(list)) => match parse_bandlist(list) {
            Some(bands) => ActionCommand::SetBands {
                tech: RadioTech::Lte,
                bands,
            },
            None => unknown(),
        },
        ("SET_NR5G_BANDS", Some(list)) => match parse_bandlist(list) {
            Some(bands) => ActionCommand::SetBands {
                tech: RadioTech::Nr5g,
                bands,
            },
            None => unknown(),
        },
        _ => unknown(),
    }
}

/// Parse a colon-delimited band list (`"1:3:7"`). `None` when the list is
/// empty or any element is not an integer – blacklist checks are not done
/// here, the executor owns those.
fn parse_bandlist(list: &str) -> Option<Vec<u16>> {
    let bands: Option<Vec<u16>> = list
        .split(':')
        .map(|part| part.trim().parse().ok())
        .collect();
    bands.filter(|b| !b.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_the_wait_fail_safe() {
        assert_eq!(decode(""), ActionCommand::Wait { minutes: 5 });
        assert_eq!(decode("   \n"), ActionCommand::Wait { minutes: 5 });
    }

    #[test]
    fn wait_with_minutes() {
        assert_eq!(decode("WAIT:10"), ActionCommand::Wait { minutes: 10 });
        assert_eq!(decode("WAIT: 5"), ActionCommand::Wait { minutes: 5 });
    }

    #[test]
    fn wait_without_or_with_bad_minutes_uses_default() {
        assert_eq!(decode("WAIT"), ActionCommand::Wait { minutes: 5 });
        assert_eq!(decode("WAIT:soon"), ActionCommand::Wait { minutes: 5 });
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(decode("restart_modem"), ActionCommand::RestartModem);
        assert_eq!(decode("Reset_Bands"), ActionCommand::ResetBands);
        assert_eq!(decode("full_scan"), ActionCommand::FullScan);
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert_eq!(decode("  RESTART_MODEM \n"), ActionCommand::RestartModem);
    }

    #[test]
    fn band_lock_with_list() {
        assert_eq!(
            decode("SET_LTE_BANDS:1:3:7"),
            ActionCommand::SetBands {
                tech: RadioTech::Lte,
                bands: vec![1, 3, 7],
            }
        );
        assert_eq!(
            decode("set_nr5g_bands:78"),
            ActionCommand::SetBands {
                tech: RadioTech::Nr5g,
                bands: vec![78],
            }
        );
    }

    #[test]
    fn band_lock_without_args_is_unknown() {
        assert_eq!(
            decode("SET_LTE_BANDS"),
            ActionCommand::Unknown {
                raw: "SET_LTE_BANDS".into()
            }
        );
    }

    #[test]
    fn malformed_bandlist_is_unknown() {
        assert!(matches!(
            decode("SET_LTE_BANDS:1:three:7"),
            ActionCommand::Unknown { .. }
        ));
        assert!(matches!(
            decode("SET_NR5G_BANDS:"),
            ActionCommand::Unknown { .. }
        ));
    }

    #[test]
    fn unexpected_args_on_argless_name_is_unknown() {
        assert!(matches!(
            decode("RESTART_MODEM:now"),
            ActionCommand::Unknown { .. }
        ));
    }

    #[test]
    fn unrecognized_name_preserves_raw_text() {
        let decoded = decode("  REBOOT_EVERYTHING:yes  ");
        assert_eq!(
            decoded,
            ActionCommand::Unknown {
                raw: "REBOOT_EVERYTHING:yes".into()
            }
        );
    }
}
