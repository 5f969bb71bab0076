//! User-Friendly Error Formatting
//!
//! Turns errors surfaced by the binary into messages with troubleshooting
//! hints for the common cases.

use std::fmt::Write;

use crate::composition::CompositionError;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    let error_msg = error.to_string();
    let composition = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CompositionError>());

    if let Some(composition) = composition {
        format_composition_error(&mut output, composition);
    } else if error_msg.contains("scenario") {
        format_scenario_error(&mut output, &error_msg);
    } else if error_msg.contains("config") {
        format_config_error(&mut output, &error_msg);
    } else {
        format_generic_error(&mut output, &error_msg);
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: screen-coordinator -vv"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Use --log-format json to capture structured logs"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

fn format_composition_error(output: &mut String, error: &CompositionError) {
    writeln!(output, "Composition Request Rejected").ok();
    writeln!(output).ok();
    writeln!(output, "{}", error).ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();

    match error {
        CompositionError::NoTarget => {
            writeln!(output, "  1. Anchor screen is not connected").ok();
            writeln!(output, "     → Connect it before the mirror request").ok();
            writeln!(output).ok();
            writeln!(output, "  2. Every target was invalid or the anchor itself").ok();
            writeln!(
                output,
                "     → Targets must be connected screens of a known kind"
            )
            .ok();
            writeln!(
                output,
                "     → make_expand never targets the default screen"
            )
            .ok();
        }
        CompositionError::MirrorDisabled => {
            writeln!(output, "  1. Mirroring was switched off").ok();
            writeln!(output, "     → Re-enable with a disable_mirror = false step").ok();
            writeln!(
                output,
                "     → Or set composition.mirror_disabled = false in config.toml"
            )
            .ok();
        }
        CompositionError::PermissionDenied(request) => {
            writeln!(output, "  1. The caller may not issue {}", request).ok();
            writeln!(output, "     → Check the permission gate configuration").ok();
        }
        CompositionError::InvalidArgument(_) => {
            writeln!(output, "  1. Malformed request").ok();
            writeln!(
                output,
                "     → make_expand needs exactly one start point per screen"
            )
            .ok();
        }
        CompositionError::NotVirtual(_) => {
            writeln!(output, "  1. The screen is backed by real hardware").ok();
            writeln!(
                output,
                "     → Only virtual screens can be bound or destroyed"
            )
            .ok();
        }
        CompositionError::PlacementFailed(_) => {
            writeln!(output, "  1. The screen reports no usable mode").ok();
            writeln!(output, "     → Reconnect it once its mode is known").ok();
        }
        CompositionError::ScreenNotFound(_)
        | CompositionError::NotGrouped(_)
        | CompositionError::AlreadyMember(_) => {
            writeln!(output, "  1. Screen state changed before the request").ok();
            writeln!(output, "     → Re-query the screen and retry").ok();
        }
    }
}

fn format_scenario_error(output: &mut String, _error: &str) {
    writeln!(output, "Scenario Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with the scenario file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Unknown action").ok();
    writeln!(
        output,
        "     → Valid: connect, disconnect, create_virtual, make_mirror,"
    )
    .ok();
    writeln!(
        output,
        "       make_expand, make_unique, stop_mirror, stop_expand, remove_virtual"
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  2. Screen referenced before it was created").ok();
    writeln!(
        output,
        "     → Names resolve only after their connect / create_virtual step"
    )
    .ok();
}

fn format_config_error(output: &mut String, _error: &str) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Configuration file not found").ok();
    writeln!(
        output,
        "     → Specify: screen-coordinator -c /path/to/config.toml"
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Invalid values").ok();
    writeln!(output, "     → first_logical_id must be at least 2").ok();
    writeln!(
        output,
        "     → logging.format must be pretty, compact or json"
    )
    .ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Coordinator Error").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composition_error_is_recognised_through_context() {
        let error = anyhow::Error::new(CompositionError::MirrorDisabled).context("Step 3 (make_mirror)");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("ERROR"));
        assert!(formatted.contains("Composition Request Rejected"));
        assert!(formatted.contains("mirror_disabled"));
    }

    #[test]
    fn test_placement_failure_formatting() {
        let error = anyhow::Error::new(CompositionError::PlacementFailed(1001));
        let formatted = format_user_error(&error);
        assert!(formatted.contains("Screen 1001 could not be placed"));
        assert!(formatted.contains("no usable mode"));
    }

    #[test]
    fn test_config_error_formatting() {
        let error = anyhow::anyhow!("Failed to parse config file");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("Configuration Error"));
    }

    #[test]
    fn test_scenario_error_formatting() {
        let error = anyhow::anyhow!("Failed to parse scenario");
        assert!(format_user_error(&error).contains("Scenario Error"));
    }
}
