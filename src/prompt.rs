//! Interactive collection of a [`LicenseRequest`].
//!
//! Generic over the input/output streams so the prompts can be driven from
//! tests.

use std::io::{BufRead, Write};

use crate::errors::{InputError, LicenseResult};
use crate::issue::LicenseRequest;

/// Ask `label` and read one line. Returns `None` for an empty answer.
pub fn prompt_line<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
) -> LicenseResult<Option<String>> {
    write!(output, "{label}: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    let answer = line.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}

/// Fill in whatever `partial` is missing by prompting.
///
/// `machine_default` is offered when the machine id is left blank (usually
/// the resolved identity of the current machine).
pub fn complete_request<R: BufRead, W: Write>(
    mut partial: LicenseRequest,
    machine_default: Option<&str>,
    input: &mut R,
    output: &mut W,
) -> LicenseResult<LicenseRequest> {
    if partial.machine_id.trim().is_empty() {
        let label = match machine_default {
            Some(current) => format!("Machine ID [{current}]"),
            None => "Machine ID (aa:bb:cc:dd:ee:ff)".to_string(),
        };
        partial.machine_id = match (prompt_line(input, output, &label)?, machine_default) {
            (Some(answer), _) => answer,
            (None, Some(current)) => current.to_string(),
            (None, None) => {
                return Err(InputError::InvalidMachineId(String::new()).into());
            }
        };
    }

    if partial.customer_name.trim().is_empty() {
        partial.customer_name =
            prompt_line(input, output, "Customer name")?.ok_or(InputError::InvalidCustomer)?;
    }

    if partial.expiry.is_none() {
        partial.expiry = prompt_line(input, output, "Expiry date (YYYY-MM-DD, blank for one year)")?;
    }

    if partial.features.is_empty() {
        if let Some(answer) = prompt_line(input, output, "Features (comma-separated, blank for default)")? {
            partial.features = split_features(&answer);
        }
    }

    Ok(partial)
}

/// Split a comma-separated feature list, dropping blanks.
pub fn split_features(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LicenseError;
    use std::io::Cursor;

    #[test]
    fn prompts_for_every_missing_field() {
        let mut input = Cursor::new("aa:bb:cc:dd:ee:ff\nAcme Corp\n2025-01-01\nbasic, reports\n");
        let mut output = Vec::new();

        let request =
            complete_request(LicenseRequest::default(), None, &mut input, &mut output).unwrap();

        assert_eq!(request.machine_id, "aa:bb:cc:dd:ee:ff");
        assert_eq!(request.customer_name, "Acme Corp");
        assert_eq!(request.expiry.as_deref(), Some("2025-01-01"));
        assert_eq!(request.features, vec!["basic", "reports"]);

        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("Machine ID"));
        assert!(shown.contains("Customer name"));
    }

    #[test]
    fn blank_machine_id_uses_offered_default() {
        let mut input = Cursor::new("\nAcme Corp\n\n\n");
        let mut output = Vec::new();

        let request = complete_request(
            LicenseRequest::default(),
            Some("11:22:33:44:55:66"),
            &mut input,
            &mut output,
        )
        .unwrap();

        assert_eq!(request.machine_id, "11:22:33:44:55:66");
        assert!(request.expiry.is_none());
        assert!(request.features.is_empty());
    }

    #[test]
    fn provided_fields_are_not_prompted() {
        let partial = LicenseRequest {
            machine_id: "aa:bb:cc:dd:ee:ff".to_string(),
            customer_name: "Acme Corp".to_string(),
            expiry: Some("2025-01-01".to_string()),
            features: vec!["basic".to_string()],
        };
        let mut input = Cursor::new("");
        let mut output = Vec::new();

        let request = complete_request(partial.clone(), None, &mut input, &mut output).unwrap();
        assert_eq!(request, partial);
        assert!(output.is_empty());
    }

    #[test]
    fn blank_customer_is_rejected() {
        let mut input = Cursor::new("aa:bb:cc:dd:ee:ff\n\n");
        let mut output = Vec::new();

        let err = complete_request(LicenseRequest::default(), None, &mut input, &mut output)
            .unwrap_err();
        assert!(matches!(
            err,
            LicenseError::InvalidInput(InputError::InvalidCustomer)
        ));
    }

    #[test]
    fn split_features_drops_blanks() {
        assert_eq!(split_features(" a, ,b,,"), vec!["a", "b"]);
        assert!(split_features("").is_empty());
    }
}
