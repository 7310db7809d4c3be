use serde_json::Value;

use crate::types::{Locator, LocatorStrategy};

/// Measures the whole document so screenshots cover more than the viewport.
pub const PAGE_SIZE_JS: &str = r#"
(() => {
  const d = document.documentElement;
  return JSON.stringify([Math.max(d.scrollWidth, d.clientWidth), Math.max(d.scrollHeight, d.clientHeight)]);
})()
"#;

/// What a page script reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReply {
    Flag(bool),
    Ok,
    Missing,
    NoOption,
    Error(String),
}

/// Interpret the value returned by one of the scripts in this module.
pub fn interpret(value: Option<Value>) -> ScriptReply {
    match value {
        Some(Value::Bool(b)) => ScriptReply::Flag(b),
        Some(Value::String(s)) => match s.as_str() {
            "ok" => ScriptReply::Ok,
            "missing" => ScriptReply::Missing,
            "no-option" => ScriptReply::NoOption,
            other => ScriptReply::Error(other.trim_start_matches("error:").to_string()),
        },
        other => ScriptReply::Error(format!("unexpected script result: {:?}", other)),
    }
}

pub fn presence(locator: &Locator) -> String {
    wrap(locator, "return el !== null;")
}

/// Rendered, visible and enabled. Mirrors what a user could click.
pub fn interactable(locator: &Locator) -> String {
    wrap(
        locator,
        "if (!el) return false;
    const s = getComputedStyle(el);
    return el.getClientRects().length > 0 && s.visibility !== 'hidden' && s.display !== 'none' && !el.disabled;",
    )
}

pub fn click(locator: &Locator) -> String {
    wrap(locator, "if (!el) return 'missing'; el.click(); return 'ok';")
}

pub fn clear(locator: &Locator) -> String {
    wrap(
        locator,
        "if (!el) return 'missing';
    el.focus();
    el.value = '';
    el.dispatchEvent(new Event('input', { bubbles: true }));
    return 'ok';",
    )
}

pub fn focus(locator: &Locator) -> String {
    wrap(locator, "if (!el) return 'missing'; el.focus(); return 'ok';")
}

pub fn select(locator: &Locator, value: &str) -> String {
    let value = js_string(value);
    wrap(
        locator,
        &format!(
            "if (!el) return 'missing';
    const opt = [...el.options].find(o => o.value === {value});
    if (!opt) return 'no-option';
    el.value = {value};
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return 'ok';"
        ),
    )
}

pub fn checked(locator: &Locator) -> String {
    wrap(locator, "return !!(el && el.checked);")
}

fn wrap(locator: &Locator, body: &str) -> String {
    format!(
        "(() => {{
  try {{
    const el = {};
    {}
  }} catch (e) {{
    return 'error:' + e.message;
  }}
}})()",
        resolve(locator),
        body
    )
}

/// JS expression evaluating to the element or `null`.
fn resolve(locator: &Locator) -> String {
    let sel = js_string(&locator.selector);
    match locator.strategy {
        LocatorStrategy::Css => format!("document.querySelector({sel})"),
        LocatorStrategy::Id => format!("document.getElementById({sel})"),
        LocatorStrategy::Name => format!("(document.getElementsByName({sel})[0] || null)"),
        LocatorStrategy::XPath => format!(
            "document.evaluate({sel}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue"
        ),
    }
}

fn js_string(raw: &str) -> String {
    Value::String(raw.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selectors_are_embedded_as_string_literals() {
        let script = click(&Locator::xpath("//button[contains(., 'Ir a mis viajes')]"));
        assert!(script.contains(r#"document.evaluate("//button[contains(., 'Ir a mis viajes')]""#));

        let script = presence(&Locator::css(r#"input[placeholder="Email"]"#));
        assert!(script.contains(r#"document.querySelector("input[placeholder=\"Email\"]")"#));
    }

    #[test]
    fn name_locator_uses_get_elements_by_name() {
        let script = checked(&Locator::name("privacyPolicy"));
        assert!(script.contains(r#"document.getElementsByName("privacyPolicy")[0]"#));
    }

    #[test]
    fn select_compares_option_value() {
        let script = select(&Locator::name("bday bday-day"), "7");
        assert!(script.contains(r#"o.value === "7""#));
    }

    #[test]
    fn replies_are_interpreted() {
        assert_eq!(interpret(Some(json!(true))), ScriptReply::Flag(true));
        assert_eq!(interpret(Some(json!("ok"))), ScriptReply::Ok);
        assert_eq!(interpret(Some(json!("missing"))), ScriptReply::Missing);
        assert_eq!(interpret(Some(json!("no-option"))), ScriptReply::NoOption);
        assert_eq!(
            interpret(Some(json!("error:bad xpath"))),
            ScriptReply::Error("bad xpath".into())
        );
        assert!(matches!(interpret(None), ScriptReply::Error(_)));
    }
}
