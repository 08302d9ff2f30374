//! Server-rendered pages shown to scanners.

use crate::model::{EntityType, Token, TokenStatus};

const PAGE: &str = include_str!("web/page.html");

fn page(title: &str, body: &str) -> String {
    PAGE.replace("{{title}}", &escape_html(title))
        .replace("{{body}}", body)
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn entity_label(t: EntityType) -> &'static str {
    match t {
        EntityType::Product => "Product",
        EntityType::Batch => "Batch",
        EntityType::Inventory => "Inventory item",
        EntityType::Custom => "Item",
    }
}

/// Public verification page. Terminal tokens say so plainly.
pub fn verification_page(token: &Token) -> String {
    let (badge, headline, text) = match token.status {
        TokenStatus::Active => (
            r#"<span class="badge ok">VERIFIED</span>"#,
            "Genuine item",
            "This code was issued by the manufacturer and is active.",
        ),
        TokenStatus::Revoked => (
            r#"<span class="badge bad">REVOKED</span>"#,
            "This code has been revoked",
            "The manufacturer no longer vouches for this label. \
             Contact support if you believe this is a mistake.",
        ),
        TokenStatus::Expired => (
            r#"<span class="badge warn">EXPIRED</span>"#,
            "This code has expired",
            "The label is past its validity period.",
        ),
    };
    let body = format!(
        "{badge}\n<h1>{headline}</h1>\n<p>{text}</p>\n<dl><dt>{label}</dt><dd>{id}</dd></dl>",
        label = entity_label(token.entity_type),
        id = escape_html(&token.entity_id),
    );
    page("Verification", &body)
}

/// Verification preview shown for the calibration token.
pub fn calibration_page(token: &str) -> String {
    let body = format!(
        "<span class=\"badge ok\">VERIFIED</span>\n<h1>Genuine item</h1>\n\
         <p>Calibration preview. This scan is not recorded.</p>\n\
         <dl><dt>Token</dt><dd>{}</dd></dl>",
        escape_html(token)
    );
    page("Verification", &body)
}

/// Internal status view for REVOKED/EXPIRED tokens in operational mode.
pub fn internal_status_page(token: &Token, record_url: &str) -> String {
    let mut rows = vec![
        ("Token", escape_html(&token.value)),
        ("Status", token.status.to_string()),
        (
            "Entity",
            format!("{} {}", token.entity_type, escape_html(&token.entity_id)),
        ),
        ("Printed", escape_html(&token.printed_at)),
    ];
    if let Some(at) = &token.revoked_at {
        rows.push(("Revoked", escape_html(at)));
    }
    if let Some(reason) = &token.revoked_reason {
        rows.push(("Reason", escape_html(reason)));
    }
    if let Some(at) = &token.expires_at {
        rows.push(("Expires", escape_html(at)));
    }
    rows.push(("Scans", token.scan_count.to_string()));

    let dl: String = rows
        .iter()
        .map(|(k, v)| format!("<dt>{k}</dt><dd>{v}</dd>"))
        .collect();
    let body = format!(
        "<span class=\"badge bad\">{status}</span>\n<h1>Token is {status_lower}</h1>\n\
         <dl>{dl}</dl>\n<p><a href=\"{href}\">Open token record</a></p>",
        status = token.status,
        status_lower = token.status.as_str().to_lowercase(),
        href = escape_html(record_url),
    );
    page("Token status", &body)
}

pub fn not_found_page() -> String {
    page(
        "Not found",
        "<h1>Code not recognised</h1>\n<p>We could not find this code.</p>",
    )
}

pub fn unavailable_page() -> String {
    page(
        "Unavailable",
        "<h1>Temporarily unavailable</h1>\n<p>Please scan again in a moment.</p>",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(status: TokenStatus) -> Token {
        Token {
            id: "t1".into(),
            value: "qr_abc123".into(),
            status,
            entity_type: EntityType::Product,
            entity_id: "<p1>".into(),
            redirect_url: None,
            version_id: None,
            printed_at: "2025-01-01T00:00:00.000Z".into(),
            expires_at: None,
            revoked_at: Some("2025-02-01T00:00:00.000Z".into()),
            revoked_reason: Some("counterfeit \"batch\"".into()),
            scan_count: 3,
            last_scanned_at: None,
        }
    }

    #[test]
    fn escapes() {
        assert_eq!(escape_html("<a href='x'>&</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn verification_reflects_status() {
        let html = verification_page(&token(TokenStatus::Active));
        assert!(html.contains("VERIFIED"));
        assert!(html.contains("&lt;p1&gt;"));
        assert!(!html.contains("<p1>"));

        assert!(verification_page(&token(TokenStatus::Revoked)).contains("REVOKED"));
        assert!(verification_page(&token(TokenStatus::Expired)).contains("EXPIRED"));
    }

    #[test]
    fn internal_status_shows_reason() {
        let html = internal_status_page(&token(TokenStatus::Revoked), "/qr/tokens/t1");
        assert!(html.contains("counterfeit &quot;batch&quot;"));
        assert!(html.contains("href=\"/qr/tokens/t1\""));
        assert!(html.contains("Token is revoked"));
    }
}
