//! Ordered named predicates evaluated against a completed exchange.

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;
use serde_json::Value;

use crate::capabilities::wms::{attr, local_name};
use crate::executor::Exchange;

/// Name of the check recorded by [`Checks::exception_code`].
pub const EXPECTED_ERROR_CODE: &str = "expected error code present";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One acceptable outcome of a two-branch requirement.
#[derive(Debug, Clone)]
pub struct Branch {
    pub description: &'static str,
    pub matched: bool,
}

impl Branch {
    pub fn new(description: &'static str, matched: bool) -> Self {
        Self {
            description,
            matched,
        }
    }
}

/// Which branch satisfied a two-branch requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    Strict,
    Graceful,
}

#[derive(Debug, Clone, Default)]
pub struct Checks {
    items: Vec<Check>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, name: impl Into<String>, passed: bool) -> bool {
        self.push(name.into(), passed, None)
    }

    pub fn check_detail(
        &mut self,
        name: impl Into<String>,
        passed: bool,
        detail: impl Into<String>,
    ) -> bool {
        self.push(name.into(), passed, Some(detail.into()))
    }

    fn push(&mut self, name: String, passed: bool, detail: Option<String>) -> bool {
        self.items.push(Check {
            name,
            passed,
            detail,
        });
        passed
    }

    /// A test with no recorded checks never passes.
    pub fn all_passed(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|c| c.passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Check> {
        self.items.iter().filter(|c| !c.passed)
    }

    pub fn items(&self) -> &[Check] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Check> {
        self.items
    }

    pub fn status(&mut self, x: &Exchange, expected: u16) -> bool {
        let actual = x.status.as_u16();
        self.check_detail(format!("HTTP {}", expected), actual == expected, format!("got {}", actual))
    }

    pub fn content_type(&mut self, x: &Exchange, prefix: &str) -> bool {
        let actual = x.content_type().unwrap_or("<none>").to_string();
        self.check_detail(format!("Content-Type {}", prefix), x.has_content_type(prefix), actual)
    }

    pub fn image_size(&mut self, x: &Exchange, width: u32, height: u32) -> bool {
        let name = format!("image is {}x{}", width, height);
        match x.image_dimensions() {
            Some((w, h)) => self.check_detail(name, (w, h) == (width, height), format!("{}x{}", w, h)),
            None => self.check_detail(name, false, "body is not a decodable image"),
        }
    }

    /// Record whether the body parses as JSON and hand back the document.
    pub fn json_body(&mut self, x: &Exchange) -> Option<Value> {
        let json = x.json();
        self.check("body is valid JSON", json.is_some());
        json
    }

    /// Strict error check: the structured exception code matches `expected`.
    pub fn exception_code(&mut self, x: &Exchange, expected: &str) -> bool {
        let found = exception_code(x);
        let detail = match &found {
            Some(code) => format!("expected {}, found {}", expected, code),
            None => format!("expected {}, found none", expected),
        };
        self.check_detail(EXPECTED_ERROR_CODE, found.as_deref() == Some(expected), detail)
    }

    /// Two-branch acceptance: either the strict or the graceful branch satisfies the
    /// requirement. The matched branch is recorded in the check detail.
    pub fn accept_either(
        &mut self,
        name: &str,
        x: &Exchange,
        strict: Branch,
        graceful: Branch,
    ) -> Option<Accepted> {
        let accepted = if strict.matched {
            Some((Accepted::Strict, format!("strict: {}", strict.description)))
        } else if graceful.matched {
            Some((Accepted::Graceful, format!("graceful: {}", graceful.description)))
        } else {
            None
        };

        match accepted {
            Some((branch, detail)) => {
                self.check_detail(name, true, detail);
                Some(branch)
            }
            None => {
                self.check_detail(
                    name,
                    false,
                    format!(
                        "no accepted branch matched (HTTP {}, Content-Type {}); expected {} or {}",
                        x.status.as_u16(),
                        x.content_type().unwrap_or("<none>"),
                        strict.description,
                        graceful.description
                    ),
                );
                None
            }
        }
    }
}

/// Structured error code carried by an exception body.
///
/// Understands OGC XML exception reports (`ServiceException@code`,
/// `ows:Exception@exceptionCode`) and JSON exception objects (`code`, or the last
/// path segment of `type`).
pub fn exception_code(x: &Exchange) -> Option<String> {
    let text = x.text();
    let trimmed = text.trim_start();
    if trimmed.starts_with('<') {
        xml_exception(trimmed).and_then(|(_, code)| code)
    } else {
        json_exception_code(&serde_json::from_str(trimmed).ok()?)
    }
}

fn json_exception_code(json: &Value) -> Option<String> {
    if let Some(code) = json.get("code").and_then(Value::as_str) {
        return Some(code.to_string());
    }
    json.get("type")
        .and_then(Value::as_str)
        .and_then(|t| t.trim_end_matches('/').rsplit('/').next())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Returns the root element name and the first exception code when the document is an
/// exception report.
fn xml_exception(xml: &str) -> Option<(String, Option<String>)> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut root: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = local_name(&e);
                match root.as_deref() {
                    None => {
                        if name != "ServiceExceptionReport" && name != "ExceptionReport" {
                            return None;
                        }
                        root = Some(name);
                    }
                    Some(_) => {
                        let code = match name.as_str() {
                            "ServiceException" => attr(&e, "code").ok().flatten(),
                            "Exception" => attr(&e, "exceptionCode").ok().flatten(),
                            _ => None,
                        };
                        if code.is_some() {
                            return root.map(|r| (r, code));
                        }
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    root.map(|r| (r, None))
}
