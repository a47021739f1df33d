// Shared helpers for URL building and REST message formatting

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Value};
use std::ffi::OsStr;
use std::path::Path;

use crate::error::{BatchAppsError, Result};

/// Characters left unescaped when a file name is placed in a URL path
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Join URL parts by concatenation and force an https scheme
pub fn https_url(base: &str, parts: &[&str]) -> String {
    let rest = base
        .strip_prefix("https://")
        .or_else(|| base.strip_prefix("http://"))
        .unwrap_or(base);
    format!("https://{}{}", rest, parts.concat())
}

/// Join URL parts by concatenation and force an http scheme
pub fn http_url(base: &str, parts: &[&str]) -> String {
    let rest = base
        .strip_prefix("http://")
        .or_else(|| base.strip_prefix("https://"))
        .unwrap_or(base);
    format!("http://{}{}", rest, parts.concat())
}

/// Format a date string for the REST API
///
/// Keeps the digits only, padded to 17 characters.
pub fn parse_date_string(time_string: &str) -> String {
    let mut formatted: String = time_string.chars().filter(char::is_ascii_digit).collect();
    formatted.push_str("000000");
    formatted.truncate(17);
    tracing::debug!("Parsed date string {} to {}", time_string, formatted);
    formatted
}

/// Percent-encode a file name for use in a URL
pub fn url_from_filename(filename: &str) -> String {
    utf8_percent_encode(filename, PATH_SEGMENT).to_string()
}

/// Decoded last path segment of a URL, plus an optional extension
pub fn filename_from_url(url: &str, ext: Option<&str>) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let segment = path.rsplit('/').next().unwrap_or_default();
    let filename = percent_decode_str(segment).decode_utf8_lossy().to_string();

    tracing::debug!("Filename {} with extension {:?} from url {}", filename, ext, url);

    match ext {
        Some(ext) => format!("{}{}", filename, ext),
        None => filename,
    }
}

/// Check that a download name is a plain file name
///
/// Names come from the service, so anything that could leave the output
/// directory (absolute paths, `..`, separators) is refused.
pub fn download_file_name(name: &str) -> Result<&str> {
    let plain = !name.is_empty()
        && !name.contains(['/', '\\', '\0'])
        && name != "."
        && name != ".."
        && Path::new(name).file_name() == Some(OsStr::new(name));
    if plain {
        Ok(name)
    } else {
        Err(BatchAppsError::FileDownload(format!(
            "Refusing to download to unsafe file name: {:?}",
            name
        )))
    }
}

/// Turn parameter pairs into the REST `[{Name, Value}]` list
pub fn format_parameters<'a, I>(params: I) -> Value
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    Value::Array(
        params
            .into_iter()
            .map(|(k, v)| json!({"Name": k, "Value": v}))
            .collect(),
    )
}

/// Check that a JSON object has all of the given keys
pub fn valid_keys(value: &Value, keys: &[&str]) -> bool {
    match value.as_object() {
        Some(obj) => keys.iter().all(|k| obj.contains_key(*k)),
        None => false,
    }
}
