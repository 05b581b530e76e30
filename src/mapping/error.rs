//! Fehlerdefinitionen für das Mapping-Modul

use thiserror::Error;

/// Fehlertypen beim Prüfen einer Tastenbelegung
#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    /// Ein Makro ohne einen einzigen Punkt
    #[error("Leeres Makro für {0}")]
    EmptyMacro(String),

    /// Zwei Belegungen für denselben Eingabecode
    #[error("Doppelte Belegung: {0}")]
    DuplicateBinding(String),

    /// Eine Richtungstaste ist zugleich normal belegt
    #[error("Richtungstaste {0} ist zusätzlich belegt")]
    DirectionKeyBound(u32),

    /// Ungültiger Sichtbereich (oben links liegt nicht vor unten rechts)
    #[error("Ungültiger Sichtbereich: {0}")]
    InvalidBounds(String),

    /// Ungültiger Zahlenwert in der Konfiguration
    #[error("Ungültiger Wert für {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
