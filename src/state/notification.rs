//! Notification payload model.
//!
//! This module contains the strict notification type, the loosely-typed
//! wire record it is decoded from, and the normalization rules absorbing
//! legacy server spellings and sloppy timestamps.

use super::{DemandeId, NotificationId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};

/// Canonical kinds of a notification.
///
/// The back end has emitted several spellings over time; every inbound
/// value goes through [`NotificationKind::normalize`] before reaching the
/// rest of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum NotificationKind {
    /// A request has been submitted.
    #[serde(rename = "DEMANDE_CREATED")]
    #[strum(serialize = "DEMANDE_CREATED")]
    DemandeCreated,
    /// A request has been validated by a reviewer.
    #[serde(rename = "DEMANDE_VALIDATED")]
    #[strum(serialize = "DEMANDE_VALIDATED")]
    DemandeValidated,
    /// A request has been refused by a reviewer.
    #[serde(rename = "DEMANDE_REFUSED")]
    #[strum(serialize = "DEMANDE_REFUSED")]
    DemandeRefused,
    /// Any other change to a request.
    #[serde(rename = "DEMANDE_UPDATED")]
    #[strum(serialize = "DEMANDE_UPDATED")]
    DemandeUpdated,
}

impl NotificationKind {
    /// Maps any value provided by the back end to a canonical kind.
    ///
    /// Legacy French spellings are translated; anything unrecognized maps
    /// to [`NotificationKind::DemandeUpdated`]. This fallback is deliberate:
    /// an unknown event is still a change to a request.
    pub fn normalize(raw: &str) -> Self {
        let spelling = raw.trim().to_uppercase();
        match spelling.as_str() {
            "DEMANDE_VALIDEE" => NotificationKind::DemandeValidated,
            "DEMANDE_REFUSEE" => NotificationKind::DemandeRefused,
            other => NotificationKind::from_str(other).unwrap_or(NotificationKind::DemandeUpdated),
        }
    }
}

/// Read state of a notification.
///
/// Client-side the status is monotonic towards [`NotificationStatus::Lu`],
/// except when rolling back a failed mark-read mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum NotificationStatus {
    /// Not read yet.
    #[serde(rename = "NON_LU")]
    #[strum(serialize = "NON_LU")]
    NonLu,
    /// Read.
    #[serde(rename = "LU")]
    #[strum(serialize = "LU")]
    Lu,
}

impl NotificationStatus {
    /// Wire rule: only the exact `LU` spelling counts as read, anything
    /// else (including absence) is unread.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("LU") => NotificationStatus::Lu,
            _ => NotificationStatus::NonLu,
        }
    }

    /// Returns boolean indicating if the notification is unread.
    pub fn is_unread(&self) -> bool {
        matches!(self, NotificationStatus::NonLu)
    }
}

/// A server event describing a change to a request, after normalization.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Unique ID, the deduplication key.
    pub id: NotificationId,
    /// ID of the related request, if any.
    #[serde(rename = "demandeId")]
    pub demande_id: Option<DemandeId>,
    /// Canonical event kind.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Free-text subject, may be empty.
    pub subject: String,
    /// Free-text body; when empty the presentation layer synthesizes one.
    pub message: String,
    /// Read state.
    pub statut: NotificationStatus,
    /// Creation timestamp, always present.
    #[serde(rename = "dateCreation")]
    pub date_creation: DateTime<Utc>,
    /// Validation timestamp, present once a request was validated/refused.
    #[serde(rename = "dateValidation")]
    pub date_validation: Option<DateTime<Utc>>,
    /// Refusal reason, present for refused requests.
    #[serde(rename = "motifRefus")]
    pub motif_refus: Option<String>,
    /// Request category, e.g. `CONGE_STANDARD`, `AUTORISATION`, `ORDRE_MISSION`.
    pub categorie: Option<String>,
    /// Request type, e.g. `CONGE_ANNUEL`, `CONGE_SANS_SOLDE`.
    #[serde(rename = "typeDemande")]
    pub type_demande: Option<String>,
    /// Start of the requested period, ISO date or datetime.
    #[serde(rename = "periodeDebut")]
    pub periode_debut: Option<String>,
    /// End of the requested period.
    #[serde(rename = "periodeFin")]
    pub periode_fin: Option<String>,
    /// Start time (`HH:mm`), relevant for authorizations.
    #[serde(rename = "heureDebut")]
    pub heure_debut: Option<String>,
    /// End time (`HH:mm`).
    #[serde(rename = "heureFin")]
    pub heure_fin: Option<String>,
    /// Matricule of the employee who triggered the event.
    #[serde(rename = "auteurMatricule")]
    pub auteur_matricule: Option<String>,
    /// Matricule of the recipient.
    pub destinataire: Option<String>,
}

/// Loosely-typed record as the server sends it.
///
/// Every field except `id` is optional; field spellings follow the wire.
/// The only way into the strict type is [`Notification::from_wire`].
#[derive(Debug, Clone, Deserialize)]
pub struct WireNotification {
    pub id: NotificationId,
    #[serde(default, rename = "demandeId")]
    pub demande_id: Option<DemandeId>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub statut: Option<String>,
    #[serde(default, rename = "dateCreation")]
    pub date_creation: Option<String>,
    #[serde(default, rename = "dateValidation")]
    pub date_validation: Option<String>,
    #[serde(default, rename = "motifRefus")]
    pub motif_refus: Option<String>,
    #[serde(default)]
    pub categorie: Option<String>,
    #[serde(default, rename = "typeDemande")]
    pub type_demande: Option<String>,
    #[serde(default, rename = "periodeDebut")]
    pub periode_debut: Option<String>,
    #[serde(default, rename = "periodeFin")]
    pub periode_fin: Option<String>,
    #[serde(default, rename = "heureDebut")]
    pub heure_debut: Option<String>,
    #[serde(default, rename = "heureFin")]
    pub heure_fin: Option<String>,
    #[serde(default, rename = "auteurMatricule")]
    pub auteur_matricule: Option<String>,
    #[serde(default)]
    pub destinataire: Option<String>,
}

impl Notification {
    /// Total mapping from a wire record to the strict type.
    ///
    /// Defaulting rules per field:
    /// * `type`: normalized through [`NotificationKind::normalize`];
    /// * `statut`: `LU` means read, everything else unread;
    /// * `dateCreation`: normalized; falls back to now when absent or
    ///   unparseable so the field is always present;
    /// * `dateValidation`: normalized, absent stays absent;
    /// * text fields: absent becomes empty string / `None`.
    pub fn from_wire(wire: WireNotification) -> Self {
        Self {
            id: wire.id,
            demande_id: wire.demande_id,
            kind: NotificationKind::normalize(wire.kind.as_deref().unwrap_or_default()),
            subject: wire.subject.unwrap_or_default(),
            message: wire.message.unwrap_or_default(),
            statut: NotificationStatus::normalize(wire.statut.as_deref()),
            date_creation: wire
                .date_creation
                .as_deref()
                .and_then(normalize_iso_date)
                .unwrap_or_else(Utc::now),
            date_validation: wire.date_validation.as_deref().and_then(normalize_iso_date),
            motif_refus: wire.motif_refus,
            categorie: wire.categorie,
            type_demande: wire.type_demande,
            periode_debut: wire.periode_debut,
            periode_fin: wire.periode_fin,
            heure_debut: wire.heure_debut,
            heure_fin: wire.heure_fin,
            auteur_matricule: wire.auteur_matricule,
            destinataire: wire.destinataire,
        }
    }

    /// Date shown to the user: the validation date for validated/refused
    /// notifications when present, the creation date otherwise.
    pub fn display_date(&self) -> DateTime<Utc> {
        match self.kind {
            NotificationKind::DemandeValidated | NotificationKind::DemandeRefused => {
                self.date_validation.unwrap_or(self.date_creation)
            }
            _ => self.date_creation,
        }
    }

    /// Human-readable subject.
    pub fn display_subject(&self) -> &'static str {
        match self.kind {
            NotificationKind::DemandeValidated => "Demande validée",
            NotificationKind::DemandeRefused => "Demande refusée",
            NotificationKind::DemandeCreated => "Nouvelle demande",
            NotificationKind::DemandeUpdated => "Mise à jour de votre demande",
        }
    }

    /// Human-readable body: the server message when present, a sentence
    /// synthesized from kind, category and period fields otherwise.
    pub fn display_message(&self) -> String {
        let message = self.message.trim();
        if !message.is_empty() {
            return message.to_string();
        }

        let label = self.label_type_demande();
        let debut = self.periode_debut.as_deref().and_then(parse_flexible_date);
        let fin = self.periode_fin.as_deref().and_then(parse_flexible_date);
        let categorie = self.categorie.as_deref().unwrap_or_default();

        match self.kind {
            NotificationKind::DemandeValidated => {
                if categorie.starts_with("CONGE") {
                    if let Some(debut) = debut {
                        return format!(
                            "Votre demande {label} a été validée pour le {}.",
                            format_date_fr(debut)
                        );
                    }
                }
                if categorie == "AUTORISATION" {
                    if let Some(debut) = debut {
                        return format!(
                            "Votre {label} a été validée pour le {} de {} à {}.",
                            format_date_fr(debut),
                            self.heure_debut.as_deref().unwrap_or_default(),
                            self.heure_fin.as_deref().unwrap_or_default()
                        );
                    }
                }
                if categorie == "ORDRE_MISSION" {
                    if let (Some(debut), Some(fin)) = (debut, fin) {
                        return format!(
                            "Votre demande de mission a été validée du {} au {}.",
                            format_date_fr(debut),
                            format_date_fr(fin)
                        );
                    }
                }
                format!("Votre demande {label} a été validée.")
            }
            NotificationKind::DemandeRefused => format!("Votre demande {label} a été refusée."),
            NotificationKind::DemandeCreated => {
                if categorie.starts_with("CONGE") {
                    if let Some(debut) = debut {
                        return format!(
                            "Votre demande {label} a été créée pour le {}.",
                            format_date_fr(debut)
                        );
                    }
                }
                format!("Votre demande {label} a été créée.")
            }
            NotificationKind::DemandeUpdated => {
                format!("Mise à jour de votre demande {label}.")
            }
        }
    }

    /// Label of the request type, lowercased for sentence embedding.
    fn label_type_demande(&self) -> String {
        match self.type_demande.as_deref() {
            Some("CONGE_ANNUEL") => "congé annuel".to_string(),
            Some("CONGE_SANS_SOLDE") => "congé sans solde".to_string(),
            Some("CONGE_REPOS_COMPENSATEUR") => "repos compensateur".to_string(),
            Some("AUTORISATION_SORTIE") => "autorisation d'absence".to_string(),
            Some(code) => code.replace('_', " ").to_lowercase(),
            None => "demande".to_string(),
        }
    }
}

/// Normalizes a timestamp string so it is unambiguously parseable:
/// truncates the sub-second fraction to milliseconds and forces a `Z`
/// suffix when no timezone is present. Returns `None` for values that are
/// not timestamps at all.
pub fn normalize_iso_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let truncated = truncate_fraction(value);
    let candidate = if has_timezone_suffix(&truncated) {
        truncated
    } else {
        format!("{truncated}Z")
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&candidate) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Date-only values ("2025-08-01") show up in period fields.
    parse_flexible_date(value).and_then(|date| date.and_hms_opt(0, 0, 0)).map(|dt| dt.and_utc())
}

/// Parses an ISO date or datetime down to its calendar date.
fn parse_flexible_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let date_part = value.split('T').next().unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// `dd/mm/yyyy`, the format the rest of the application renders dates in.
fn format_date_fr(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Truncates a fractional-second part to at most 3 digits, keeping any
/// timezone suffix intact.
fn truncate_fraction(value: &str) -> String {
    let Some(dot) = value.find('.') else {
        return value.to_string();
    };
    let (head, rest) = value.split_at(dot + 1);
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    let (fraction, suffix) = rest.split_at(digits);
    if fraction.is_empty() {
        // A bare trailing dot is not valid RFC 3339, drop it.
        return format!("{}{}", &head[..head.len() - 1], suffix);
    }
    let fraction = &fraction[..fraction.len().min(3)];
    format!("{head}{fraction}{suffix}")
}

/// `Z` or a `±hh:mm` offset at the end of the string.
fn has_timezone_suffix(value: &str) -> bool {
    if value.ends_with('Z') {
        return true;
    }
    let bytes = value.as_bytes();
    bytes.len() >= 6
        && (bytes[bytes.len() - 6] == b'+' || bytes[bytes.len() - 6] == b'-')
        && bytes[bytes.len() - 3] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn wire(json: &str) -> WireNotification {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn normalize_kind_accepts_canonical_spellings() {
        assert_eq!(
            NotificationKind::normalize("DEMANDE_CREATED"),
            NotificationKind::DemandeCreated
        );
        assert_eq!(
            NotificationKind::normalize("demande_validated"),
            NotificationKind::DemandeValidated
        );
        assert_eq!(
            NotificationKind::normalize(" DEMANDE_REFUSED "),
            NotificationKind::DemandeRefused
        );
    }

    #[test]
    fn normalize_kind_translates_legacy_spellings() {
        assert_eq!(
            NotificationKind::normalize("DEMANDE_VALIDEE"),
            NotificationKind::DemandeValidated
        );
        assert_eq!(
            NotificationKind::normalize("demande_refusee"),
            NotificationKind::DemandeRefused
        );
    }

    #[test]
    fn normalize_kind_falls_back_to_updated() {
        assert_eq!(
            NotificationKind::normalize("SOMETHING_ELSE"),
            NotificationKind::DemandeUpdated
        );
        assert_eq!(NotificationKind::normalize(""), NotificationKind::DemandeUpdated);
    }

    #[test]
    fn normalize_status_only_exact_lu_is_read() {
        assert_eq!(NotificationStatus::normalize(Some("LU")), NotificationStatus::Lu);
        assert_eq!(NotificationStatus::normalize(Some("NON_LU")), NotificationStatus::NonLu);
        assert_eq!(NotificationStatus::normalize(Some("read")), NotificationStatus::NonLu);
        assert_eq!(NotificationStatus::normalize(None), NotificationStatus::NonLu);
    }

    #[test]
    fn normalize_iso_date_truncates_microseconds() {
        let parsed = normalize_iso_date("2025-08-01T09:30:00.123456").unwrap();
        assert_eq!(parsed.nanosecond(), 123_000_000);
    }

    #[test]
    fn normalize_iso_date_forces_timezone() {
        let parsed = normalize_iso_date("2025-08-01T09:30:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-08-01T09:30:00+00:00");
    }

    #[test]
    fn normalize_iso_date_keeps_explicit_offsets() {
        let parsed = normalize_iso_date("2025-08-01T09:30:00.500+02:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-08-01T07:30:00.500+00:00");
    }

    #[test]
    fn normalize_iso_date_accepts_date_only_values() {
        let parsed = normalize_iso_date("2025-08-01").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-08-01T00:00:00+00:00");
    }

    #[test]
    fn normalize_iso_date_rejects_garbage() {
        assert!(normalize_iso_date("").is_none());
        assert!(normalize_iso_date("not a date").is_none());
    }

    #[test]
    fn from_wire_defaults_missing_fields() {
        let n = Notification::from_wire(wire(r#"{"id": 7}"#));
        assert_eq!(n.id, 7);
        assert_eq!(n.kind, NotificationKind::DemandeUpdated);
        assert_eq!(n.statut, NotificationStatus::NonLu);
        assert!(n.subject.is_empty());
        assert!(n.message.is_empty());
        assert!(n.demande_id.is_none());
        assert!(n.date_validation.is_none());
    }

    #[test]
    fn from_wire_normalizes_legacy_payload() {
        let n = Notification::from_wire(wire(
            r#"{
                "id": 42,
                "demandeId": 9,
                "type": "DEMANDE_VALIDEE",
                "statut": "LU",
                "dateCreation": "2025-08-01T09:30:00.123456",
                "dateValidation": "2025-08-02T10:00:00"
            }"#,
        ));
        assert_eq!(n.kind, NotificationKind::DemandeValidated);
        assert_eq!(n.statut, NotificationStatus::Lu);
        assert_eq!(n.demande_id, Some(9));
        assert!(n.date_validation.is_some());
    }

    #[test]
    fn display_date_prefers_validation_date_when_reviewed() {
        let n = Notification::from_wire(wire(
            r#"{
                "id": 1,
                "type": "DEMANDE_REFUSED",
                "dateCreation": "2025-08-01T09:00:00Z",
                "dateValidation": "2025-08-03T09:00:00Z"
            }"#,
        ));
        assert_eq!(n.display_date(), n.date_validation.unwrap());
    }

    #[test]
    fn display_message_prefers_server_text() {
        let n = Notification::from_wire(wire(
            r#"{"id": 1, "type": "DEMANDE_CREATED", "message": "  Texte serveur  "}"#,
        ));
        assert_eq!(n.display_message(), "Texte serveur");
    }

    #[test]
    fn display_message_synthesizes_validated_conge() {
        let n = Notification::from_wire(wire(
            r#"{
                "id": 1,
                "type": "DEMANDE_VALIDATED",
                "categorie": "CONGE_STANDARD",
                "typeDemande": "CONGE_ANNUEL",
                "periodeDebut": "2025-08-11"
            }"#,
        ));
        assert_eq!(
            n.display_message(),
            "Votre demande congé annuel a été validée pour le 11/08/2025."
        );
    }

    #[test]
    fn display_message_synthesizes_autorisation_with_hours() {
        let n = Notification::from_wire(wire(
            r#"{
                "id": 1,
                "type": "DEMANDE_VALIDATED",
                "categorie": "AUTORISATION",
                "typeDemande": "AUTORISATION_SORTIE",
                "periodeDebut": "2025-08-11",
                "heureDebut": "09:00",
                "heureFin": "11:00"
            }"#,
        ));
        assert_eq!(
            n.display_message(),
            "Votre autorisation d'absence a été validée pour le 11/08/2025 de 09:00 à 11:00."
        );
    }

    #[test]
    fn display_message_synthesizes_refusal_with_unknown_type() {
        let n = Notification::from_wire(wire(
            r#"{"id": 1, "type": "DEMANDE_REFUSED", "typeDemande": "ORDRE_MISSION"}"#,
        ));
        assert_eq!(n.display_message(), "Votre demande ordre mission a été refusée.");
    }
}
