//! Field extraction from the termination page markup.
//!
//! The page the ACS leaves rendered at the end of the flow is a small
//! auto-submitting form; only the `MD` and `PaRes` hidden inputs are ever of
//! interest, so a scoped pattern match over the raw markup is used instead
//! of a DOM parser. Attribute order and unrelated surrounding markup do not
//! matter.

use regex::Regex;

/// Extract the `value` attribute of the first `<input>` tag carrying
/// `name="<field>"`.
///
/// Field names are matched case-sensitively against the raw HTML text.
/// Returns `None` when the tag or its value attribute is absent.
pub fn extract_field(html: &str, field: &str) -> Option<String> {
    // Field names are fixed identifiers, never caller input, so the pattern
    // always compiles.
    let tag_re = Regex::new(&format!(r#"<input[^<>]* name="{field}"[^<>]*>"#)).ok()?;
    let tag = tag_re.find(html)?.as_str();

    let value_re = Regex::new(r#" value="(.*?)""#).ok()?;
    value_re
        .captures(tag)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

/// Extract the `MD`/`PaRes` pair from the termination page.
///
/// All-or-nothing: a page carrying only one of the two fields yields `None`.
pub fn authentication_result(html: &str) -> Option<(String, String)> {
    let md = extract_field(html, "MD")?;
    let pa_res = extract_field(html, "PaRes")?;
    Some((md, pa_res))
}
