//! Raw request command.

use serde_json::Value;

use crate::cli::{GlobalOpts, OutputFormat, RequestArgs};
use crate::error::CliError;
use crate::output;

use super::Remote;

/// Request data from `--data` or `--data-file`; must be a JSON object.
fn request_data(args: RequestArgs) -> Result<Option<Value>, CliError> {
    let raw = match (args.data, args.data_file) {
        (Some(inline), _) => inline,
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => return Ok(None),
    };
    let value: Value = serde_json::from_str(&raw)?;
    if !value.is_object() {
        return Err(CliError::Validation {
            field: "data".into(),
            reason: "request data must be a JSON object".into(),
        });
    }
    Ok(Some(value))
}

pub async fn handle(remote: &Remote, args: RequestArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let request_type = args.request_type.clone();
    let data = request_data(args)?;
    tracing::debug!(%request_type, has_data = data.is_some(), "sending raw request");

    let response = remote
        .engine
        .send_request(&request_type, data)
        .await
        .map_err(|e| remote.error(e))?;

    // Response shapes vary per request; table and plain fall back to JSON.
    let out = match global.output {
        OutputFormat::Table | OutputFormat::Plain => output::render_json(&response, false)?,
        ref format => output::render_single(format, &response, |_| String::new(), |_| {
            String::new()
        })?,
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
