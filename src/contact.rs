//! Contact form: input validation and email rendering.

use serde::{Deserialize, Serialize};

use crate::{
    config::EmailConfig,
    error::{AppError, Result},
    mail::OutgoingEmail,
};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_SUBJECT_LEN: usize = 200;
pub const MAX_MESSAGE_LEN: usize = 5000;
pub const MAX_OPTIONAL_LEN: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    pub phone: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub success: bool,
    pub message: String,
}

impl ContactRequest {
    pub fn validate(&self) -> Result<()> {
        required("nome", &self.name, MAX_NAME_LEN)?;
        validate_email(&self.email)?;
        required("oggetto", &self.subject, MAX_SUBJECT_LEN)?;
        required("messaggio", &self.message, MAX_MESSAGE_LEN)?;

        if let Some(phone) = non_blank(&self.phone) {
            validate_phone(phone)?;
        }
        if let Some(company) = non_blank(&self.company) {
            if company.chars().count() > MAX_OPTIONAL_LEN {
                return Err(AppError::Validation(format!(
                    "Il campo azienda supera i {MAX_OPTIONAL_LEN} caratteri"
                )));
            }
        }
        Ok(())
    }

    pub fn to_email(&self, config: &EmailConfig) -> OutgoingEmail {
        OutgoingEmail {
            from: config.from.clone(),
            to: vec![config.contact_recipient.clone()],
            subject: format!("[BookingHSE] {}", single_line(self.subject.trim())),
            html: self.html_body(),
            text: self.text_body(),
            reply_to: Some(self.email.trim().to_string()),
        }
    }

    fn html_body(&self) -> String {
        let mut rows = vec![
            ("Nome", escape_html(self.name.trim())),
            ("Email", escape_html(self.email.trim())),
        ];
        if let Some(phone) = non_blank(&self.phone) {
            rows.push(("Telefono", escape_html(phone)));
        }
        if let Some(company) = non_blank(&self.company) {
            rows.push(("Azienda", escape_html(company)));
        }
        rows.push(("Oggetto", escape_html(self.subject.trim())));

        let table: String = rows
            .iter()
            .map(|(label, value)| {
                format!("<tr><td style=\"padding:4px 12px 4px 0\"><strong>{label}</strong></td><td>{value}</td></tr>")
            })
            .collect();

        let message = escape_html(self.message.trim()).replace('\n', "<br>");

        format!(
            "<div style=\"font-family:Arial,sans-serif;color:#1f2937\">\
             <h2 style=\"color:#2563eb\">Nuovo messaggio dal modulo contatti</h2>\
             <table>{table}</table>\
             <h3>Messaggio</h3><p>{message}</p>\
             </div>"
        )
    }

    fn text_body(&self) -> String {
        let mut text = format!(
            "Nuovo messaggio dal modulo contatti\n\nNome: {}\nEmail: {}\n",
            self.name.trim(),
            self.email.trim()
        );
        if let Some(phone) = non_blank(&self.phone) {
            text.push_str(&format!("Telefono: {phone}\n"));
        }
        if let Some(company) = non_blank(&self.company) {
            text.push_str(&format!("Azienda: {company}\n"));
        }
        text.push_str(&format!("Oggetto: {}\n\n{}\n", self.subject.trim(), self.message.trim()));
        text
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required(field: &str, value: &str, max_len: usize) -> Result<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("Il campo {field} è obbligatorio")));
    }
    if value.chars().count() > max_len {
        return Err(AppError::Validation(format!(
            "Il campo {field} supera i {max_len} caratteri"
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let invalid = || AppError::Validation("Indirizzo email non valido".into());

    if email.is_empty() || email.len() > 254 || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || local.len() > 64 || domain.contains('@') {
        return Err(invalid());
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err(invalid());
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<()> {
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' ' | '.'));
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if !allowed || !(6..=15).contains(&digits) {
        return Err(AppError::Validation("Numero di telefono non valido".into()));
    }
    Ok(())
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
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

/// Header values must not carry line breaks.
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn request() -> ContactRequest {
        ContactRequest {
            name: "Mario Rossi".into(),
            email: "mario.rossi@example.it".into(),
            subject: "Preventivo DVR".into(),
            message: "Buongiorno,\nvorrei un preventivo.".into(),
            phone: Some("+39 02 1234567".into()),
            company: Some("Rossi S.r.l.".into()),
        }
    }

    #[test]
    fn accepts_a_complete_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn rejects_missing_fields() {
        for field in ["name", "subject", "message"] {
            let mut req = request();
            match field {
                "name" => req.name = "   ".into(),
                "subject" => req.subject.clear(),
                _ => req.message.clear(),
            }
            assert!(matches!(req.validate(), Err(AppError::Validation(_))), "{field}");
        }
    }

    #[test]
    fn rejects_bad_emails() {
        for email in ["", "mario", "mario@", "@example.it", "a@b@c.it", "mario@example", "mario @example.it", "a@x..it"] {
            assert!(validate_email(email).is_err(), "{email}");
        }
        assert!(validate_email(" mario@example.it ").is_ok());
    }

    #[test]
    fn rejects_overlong_message_and_bad_phone() {
        let mut req = request();
        req.message = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(req.validate().is_err());

        let mut req = request();
        req.phone = Some("chiamami".into());
        assert!(req.validate().is_err());

        let mut req = request();
        req.phone = Some("  ".into());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn escapes_html_special_characters() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script> & 'y'"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; &#39;y&#39;"
        );
    }

    #[test]
    fn email_body_never_contains_raw_markup_from_user() {
        let mut req = request();
        req.name = "<b>Mario</b>".into();
        req.message = "<img src=x onerror=alert(1)>".into();
        let email = req.to_email(&AppConfig::default().email);

        assert!(!email.html.contains("<b>Mario</b>"));
        assert!(!email.html.contains("<img"));
        assert!(email.html.contains("&lt;b&gt;Mario&lt;/b&gt;"));
        assert!(email.text.contains("<b>Mario</b>"));
        assert_eq!(email.reply_to.as_deref(), Some("mario.rossi@example.it"));
        assert_eq!(email.to, vec!["info@bookinghse.com".to_string()]);
    }

    #[test]
    fn subject_is_kept_on_one_line() {
        let mut req = request();
        req.subject = "Ciao\r\nBcc: x@y.it".into();
        let email = req.to_email(&AppConfig::default().email);
        assert_eq!(email.subject, "[BookingHSE] Ciao  Bcc: x@y.it");
    }

    #[test]
    fn newlines_in_message_become_breaks() {
        let email = request().to_email(&AppConfig::default().email);
        assert!(email.html.contains("Buongiorno,<br>vorrei un preventivo."));
    }
}
