//! Rendering of command failures for the terminal.

use mantle_core::{Error, ErrorKind, reason_phrase};

/// A failure ready to print: message lines and the process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub lines: Vec<String>,
    pub exit_code: u8,
    /// The underlying error message, used for JSON output.
    pub message: String,
}

impl Report {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

const LOGS_HINT: &str = "There may be additional information in the store logs.";

/// Turn a command error into user-facing lines.
///
/// The innermost library error decides the wording and exit code; context
/// added by the CLI is only used when no library error is present.
pub fn render(err: &anyhow::Error) -> Report {
    let core = err.chain().find_map(|e| e.downcast_ref::<Error>());

    let exit_code = core.map_or(1, |e| exit_code(e.kind()));
    let http = core.and_then(|e| match e {
        Error::Http { status, message } => Some((*status, message.clone())),
        Error::NotFound { .. } => Some((404, String::new())),
        _ => None,
    });
    let message = match core {
        Some(e) => e.to_string(),
        None => err.to_string(),
    };

    let lines = match http {
        Some((status, body)) => http_lines(status, &body),
        None if message.trim().is_empty() => vec![
            "The command failed, but there is no error message available.".to_string(),
            String::new(),
            "Check your store log to learn if your request reached the store.".to_string(),
        ],
        None => vec![
            format!("The command failed with error message: {}", message),
            String::new(),
            LOGS_HINT.to_string(),
        ],
    };

    Report {
        lines,
        exit_code,
        message,
    }
}

fn http_lines(status: u16, body: &str) -> Vec<String> {
    let reason = reason_phrase(status);
    let mut lines = vec![
        format!("Blob store responded with HTTP {} ({}).", status, reason),
        String::new(),
    ];
    if !body.is_empty() && body != reason {
        lines.push(format!("The error message is: {}", body));
        lines.push(String::new());
    }
    lines.push(LOGS_HINT.to_string());
    lines
}

pub fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::InvalidReference | ErrorKind::InvalidPath => 2,
        ErrorKind::PathNotFound => 3,
        ErrorKind::CorruptManifest => 4,
        ErrorKind::BlobStore => 5,
        ErrorKind::Io => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn report(err: Error) -> Report {
        let result: anyhow::Result<()> = Err(err).context("Failed to list manifest");
        render(&result.unwrap_err())
    }

    #[test]
    fn test_invalid_reference() {
        let report = report(Error::invalid_reference("g".repeat(64), 128));
        assert_eq!(
            report.lines[0],
            format!(
                "The command failed with error message: value not valid hex string of length 128: {}",
                "g".repeat(64)
            )
        );
        assert_eq!(report.lines[2], LOGS_HINT);
        assert_eq!(report.exit_code, 2);
    }

    #[test]
    fn test_path_not_found() {
        let reference = "76".repeat(32);
        let report = report(Error::path_not_found(&reference, "b"));
        assert_eq!(
            report.lines[0],
            format!(
                "The command failed with error message: Could not deserialize or find node for reference {} and path b",
                reference
            )
        );
        assert_eq!(report.exit_code, 3);
    }

    #[test]
    fn test_http_404() {
        let report = report(Error::http(404, "Not Found"));
        assert_eq!(
            report.text(),
            "Blob store responded with HTTP 404 (Not Found).\n\n\
             There may be additional information in the store logs."
        );
        assert_eq!(report.exit_code, 5);
    }

    #[test]
    fn test_missing_object_renders_as_404() {
        let report = report(Error::not_found("11".repeat(32)));
        assert_eq!(report.lines[0], "Blob store responded with HTTP 404 (Not Found).");
    }

    #[test]
    fn test_http_500_with_body() {
        let report = report(Error::http(500, "disk full"));
        assert_eq!(
            report.lines,
            vec![
                "Blob store responded with HTTP 500 (Internal Server Error).",
                "",
                "The error message is: disk full",
                "",
                LOGS_HINT,
            ]
        );
    }

    #[test]
    fn test_empty_message() {
        let report = render(&anyhow::anyhow!(""));
        assert_eq!(
            report.lines[0],
            "The command failed, but there is no error message available."
        );
        assert_eq!(
            report.lines[2],
            "Check your store log to learn if your request reached the store."
        );
        assert_eq!(report.exit_code, 1);
    }

    #[test]
    fn test_plain_error() {
        let report = render(&anyhow::anyhow!("--as requires a single file"));
        assert_eq!(
            report.lines[0],
            "The command failed with error message: --as requires a single file"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(ErrorKind::InvalidPath), 2);
        assert_eq!(exit_code(ErrorKind::CorruptManifest), 4);
        assert_eq!(exit_code(ErrorKind::Io), 1);
    }
}
