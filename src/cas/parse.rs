//! Validation response bodies.
//!
//! CAS 1.0 (`/validate`) answers with two lines of text, `yes` and the user
//! name, or `no`. CAS 2.0 and 3.0 (`/serviceValidate`, `/p3/serviceValidate`)
//! answer with a `cas:serviceResponse` XML document. Both shapes are detected
//! from the body itself, so the validate path alone selects the protocol.

use super::*;

pub fn parse_response(body: &str) -> ValidationResult {
    let body = body.trim_start_matches('\u{feff}');
    let trimmed = body.trim();
    if trimmed.starts_with('<') {
        return parse_xml(trimmed);
    }
    parse_text(body)
}

fn parse_text(body: &str) -> ValidationResult {
    use ValidationFailure::*;

    let mut lines = body.split('\n').map(|line| line.trim_end_matches('\r'));
    match lines.next() {
        Some("yes") => match lines.next().map(str::trim) {
            Some(user) if !user.is_empty() => ValidationResult::Success(Principal::new(user)),
            _ => ValidationResult::Failure(MalformedResponse),
        },
        Some("no") => ValidationResult::Failure(TicketNotRecognized(None)),
        _ => ValidationResult::Failure(MalformedResponse),
    }
}

fn parse_xml(xml: &str) -> ValidationResult {
    use ValidationFailure::*;

    if !xml.contains("<cas:serviceResponse") {
        return ValidationResult::Failure(MalformedResponse);
    }

    if xml.contains("<cas:authenticationFailure") {
        let code = get_all_between_strict(xml, "<cas:authenticationFailure code=\"", "\"")
            .or_else(|| get_all_between_strict(xml, "<cas:authenticationFailure code='", "'"))
            .map(str::trim)
            .unwrap_or_default();
        let after_tag = get_all_after(xml, "<cas:authenticationFailure");
        let message = get_all_between_strict(after_tag, ">", "</cas:authenticationFailure>")
            .map(|m| unescape(m.trim()))
            .unwrap_or_default();
        return ValidationResult::Failure(classify_failure(code, &message));
    }

    let success = match get_all_between_strict(xml, "<cas:authenticationSuccess>", "</cas:authenticationSuccess>") {
        Some(success) => success,
        None => return ValidationResult::Failure(MalformedResponse),
    };
    let user = match get_all_between_strict(success, "<cas:user>", "</cas:user>") {
        Some(user) if !user.trim().is_empty() => unescape(user.trim()),
        _ => return ValidationResult::Failure(MalformedResponse),
    };

    let mut principal = Principal::new(user);
    if let Some(attributes) = get_all_between_strict(success, "<cas:attributes>", "</cas:attributes>") {
        principal.attributes = parse_attributes(attributes);
    }
    ValidationResult::Success(principal)
}

fn classify_failure(code: &str, message: &str) -> ValidationFailure {
    let reason = match (code.is_empty(), message.is_empty()) {
        (true, true) => None,
        (false, true) => Some(code.to_string()),
        (true, false) => Some(message.to_string()),
        (false, false) => Some(format!("{code}: {message}")),
    };

    match code {
        "INVALID_SERVICE" => ValidationFailure::ServiceMismatch(reason),
        "INVALID_TICKET" if message.to_ascii_lowercase().contains("expired") => ValidationFailure::TicketExpired(reason),
        _ => ValidationFailure::TicketNotRecognized(reason),
    }
}

/// Reads the flat `<cas:name>value</cas:name>` children of `cas:attributes`.
/// Repeated elements accumulate as multiple values.
fn parse_attributes(mut block: &str) -> BTreeMap<String, Vec<String>> {
    let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();

    while let Some(tag) = get_all_between_strict(block, "<cas:", ">") {
        let name = tag.trim_end_matches('/').trim();
        if name.is_empty() || name.starts_with('/') || name.contains(char::is_whitespace) {
            block = get_all_after(block, &format!("<cas:{tag}>"));
            continue;
        }

        let open = format!("<cas:{name}>");
        let close = format!("</cas:{name}>");
        if tag.ends_with('/') {
            attributes.entry(name.to_string()).or_default().push(String::new());
            block = get_all_after(block, &format!("<cas:{tag}>"));
            continue;
        }
        match get_all_between_strict(block, &open, &close) {
            Some(value) => {
                attributes.entry(name.to_string()).or_default().push(unescape(value.trim()));
                block = get_all_after(block, &close);
            }
            None => break,
        }
    }

    attributes
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
