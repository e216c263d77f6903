//! Fixed reason-phrase table for the status codes this service emits.

pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Timeout",
        409 => "Conflict",
        418 => "No Such Handler",
        499 => "Client error",
        500 => "Internal Error",
        501 => "Not Implemented",
        502 => "Backend Error",
        503 => "Busy",
        _ => "Wot",
    }
}
