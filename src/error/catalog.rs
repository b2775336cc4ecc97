//! Lookup table turning backend failure codes into what the front end shows.
//!
//! Codes come from four places: Postgres SQLSTATEs, PostgREST (`PGRST*`),
//! Supabase Auth and Supabase Storage, plus two synthetic network codes.
//! Anything not in the table resolves to [`UNKNOWN`].

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Database,
    Auth,
    Storage,
    Network,
    Validation,
    NotFound,
    Permission,
    Unknown,
}

/// What the error boundary offers the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryAction {
    Retry,
    Reload,
    Home,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub message: &'static str,
    pub severity: Severity,
    pub category: ErrorCategory,
    pub retryable: bool,
}

impl ErrorInfo {
    const fn new(
        code: &'static str,
        message: &'static str,
        severity: Severity,
        category: ErrorCategory,
        retryable: bool,
    ) -> Self {
        Self {
            code,
            message,
            severity,
            category,
            retryable,
        }
    }

    pub fn recovery_actions(&self) -> Vec<RecoveryAction> {
        let mut actions = Vec::new();
        if self.retryable {
            actions.push(RecoveryAction::Retry);
        }
        // An expired session or a broken page state is only fixed by reloading.
        if self.category == ErrorCategory::Auth || self.severity == Severity::Critical {
            actions.push(RecoveryAction::Reload);
        }
        if self.severity >= Severity::High || actions.is_empty() {
            actions.push(RecoveryAction::Home);
        }
        actions
    }
}

use ErrorCategory::*;
use Severity::*;

pub const UNKNOWN: ErrorInfo = ErrorInfo::new(
    "unknown",
    "Si è verificato un errore imprevisto. Riprova più tardi.",
    Medium,
    Unknown,
    false,
);

static CATALOG: &[ErrorInfo] = &[
    ErrorInfo::new("validation", "Controlla i dati inseriti.", Low, Validation, false),
    // Postgres
    ErrorInfo::new("23505", "Questo elemento esiste già.", Medium, Database, false),
    ErrorInfo::new(
        "23503",
        "Riferimento non valido: l'elemento collegato non esiste.",
        Medium,
        Database,
        false,
    ),
    ErrorInfo::new("23502", "Mancano alcuni campi obbligatori.", Low, Validation, false),
    ErrorInfo::new(
        "23514",
        "I dati inseriti non rispettano i vincoli richiesti.",
        Low,
        Validation,
        false,
    ),
    ErrorInfo::new("22P02", "Formato dei dati non valido.", Low, Validation, false),
    ErrorInfo::new("22001", "Uno dei valori inseriti è troppo lungo.", Low, Validation, false),
    ErrorInfo::new(
        "42501",
        "Non hai i permessi per eseguire questa operazione.",
        High,
        Permission,
        false,
    ),
    ErrorInfo::new("42P01", "Risorsa del database non disponibile.", Critical, Database, false),
    ErrorInfo::new("42703", "Struttura dei dati non valida.", Critical, Database, false),
    ErrorInfo::new("40001", "Conflitto temporaneo sui dati, riprova.", Medium, Database, true),
    ErrorInfo::new("40P01", "Conflitto temporaneo sui dati, riprova.", Medium, Database, true),
    ErrorInfo::new(
        "53300",
        "Il servizio è momentaneamente sovraccarico. Riprova tra poco.",
        High,
        Database,
        true,
    ),
    ErrorInfo::new("57014", "L'operazione ha richiesto troppo tempo.", Medium, Database, true),
    ErrorInfo::new(
        "08001",
        "Impossibile connettersi al database. Riprova tra poco.",
        Critical,
        Database,
        true,
    ),
    ErrorInfo::new(
        "08006",
        "La connessione al database si è interrotta. Riprova tra poco.",
        Critical,
        Database,
        true,
    ),
    ErrorInfo::new(
        "pool_timeout",
        "Il servizio è momentaneamente sovraccarico. Riprova tra poco.",
        High,
        Database,
        true,
    ),
    // PostgREST
    ErrorInfo::new("PGRST116", "Elemento non trovato.", Low, NotFound, false),
    ErrorInfo::new(
        "PGRST301",
        "La sessione è scaduta. Effettua di nuovo l'accesso.",
        Medium,
        Auth,
        false,
    ),
    // Auth
    ErrorInfo::new("invalid_credentials", "Email o password non corretti.", Low, Auth, false),
    ErrorInfo::new(
        "email_not_confirmed",
        "Conferma il tuo indirizzo email prima di accedere.",
        Low,
        Auth,
        false,
    ),
    ErrorInfo::new(
        "user_already_exists",
        "Esiste già un account con questo indirizzo email.",
        Low,
        Auth,
        false,
    ),
    ErrorInfo::new(
        "weak_password",
        "La password è troppo debole.",
        Low,
        Validation,
        false,
    ),
    ErrorInfo::new(
        "session_not_found",
        "La sessione non è più valida. Effettua di nuovo l'accesso.",
        Medium,
        Auth,
        false,
    ),
    ErrorInfo::new(
        "bad_jwt",
        "La sessione non è più valida. Effettua di nuovo l'accesso.",
        Medium,
        Auth,
        false,
    ),
    ErrorInfo::new(
        "over_request_rate_limit",
        "Troppe richieste. Attendi qualche istante e riprova.",
        Medium,
        Network,
        true,
    ),
    ErrorInfo::new(
        "forbidden",
        "Non hai i permessi per eseguire questa operazione.",
        High,
        Permission,
        false,
    ),
    // Storage
    ErrorInfo::new("payload_too_large", "Il file è troppo grande.", Low, Storage, false),
    ErrorInfo::new("invalid_mime_type", "Tipo di file non supportato.", Low, Storage, false),
    ErrorInfo::new("object_not_found", "File non trovato.", Low, Storage, false),
    ErrorInfo::new(
        "duplicate_object",
        "Esiste già un file con questo nome.",
        Low,
        Storage,
        false,
    ),
    ErrorInfo::new(
        "bucket_not_found",
        "Archivio file non disponibile.",
        Critical,
        Storage,
        false,
    ),
    ErrorInfo::new(
        "storage_unavailable",
        "Il servizio di archiviazione non è raggiungibile. Riprova tra poco.",
        High,
        Storage,
        true,
    ),
    // Network
    ErrorInfo::new(
        "network_error",
        "Problema di connessione. Controlla la rete e riprova.",
        Medium,
        Network,
        true,
    ),
    ErrorInfo::new(
        "timeout",
        "Il server non ha risposto in tempo. Riprova.",
        Medium,
        Network,
        true,
    ),
    ErrorInfo::new(
        "service_unavailable",
        "Servizio esterno momentaneamente non disponibile. Riprova tra poco.",
        High,
        Network,
        true,
    ),
];

/// Resolve a code to its catalog entry, falling back to [`UNKNOWN`].
pub fn lookup(code: &str) -> &'static ErrorInfo {
    CATALOG
        .iter()
        .find(|info| info.code == code)
        .unwrap_or(&UNKNOWN)
}

pub fn is_known(code: &str) -> bool {
    CATALOG.iter().any(|info| info.code == code)
}

/// Storage and external APIs answer with HTTP statuses rather than codes.
pub fn code_for_http_status(status: u16) -> &'static str {
    match status {
        401 => "bad_jwt",
        403 => "forbidden",
        404 => "object_not_found",
        409 => "duplicate_object",
        413 => "payload_too_large",
        415 => "invalid_mime_type",
        429 => "over_request_rate_limit",
        502..=504 => "service_unavailable",
        500..=599 => "storage_unavailable",
        _ => UNKNOWN.code,
    }
}
