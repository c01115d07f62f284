//! JSON output for CLI commands
//!
//! Structured results are a single JSON object per line.

use std::io::Write;

use serde_json::Value;

use super::errors::CliResult;

/// Write a success response
pub fn write_response(out: &mut dyn Write, data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    serde_json::to_writer(&mut *out, &response)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Write an error response
pub fn write_error(out: &mut dyn Write, code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    serde_json::to_writer(&mut *out, &response)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_object_per_line() {
        let mut out = Vec::new();
        write_response(&mut out, serde_json::json!({"entities": 2})).unwrap();
        write_error(&mut out, "E", "bad").unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], r#"{"data":{"entities":2},"status":"ok"}"#);
        assert_eq!(lines[1], r#"{"code":"E","message":"bad","status":"error"}"#);
    }
}
