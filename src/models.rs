//! Modelos de dominio: documentos de entrada, catálogo de tipos de documento,
//! metadatos extraídos y raíces del árbol de salida.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Formato físico de un fichero de entrada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Image,
    Paged,
    Text,
}

impl DocumentKind {
    /// Determina el tipo a partir de la extensión (y del MIME adivinado).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "pdf" => return Some(Self::Paged),
            "txt" => return Some(Self::Text),
            "heic" => return Some(Self::Image),
            _ => {}
        }
        let mime = mime_guess::from_path(path).first()?;
        if mime.type_() == mime_guess::mime::IMAGE {
            Some(Self::Image)
        } else {
            None
        }
    }
}

/// Un fichero de entrada descubierto por el escáner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    /// Ruta relativa a la raíz de entrada, con `/` como separador.
    pub relative: String,
    /// Nombre de la carpeta contenedora.
    pub category: String,
    pub kind: DocumentKind,
}

impl Document {
    pub fn new(root: &Path, path: &Path, kind: DocumentKind) -> Option<Self> {
        let rel = path.strip_prefix(root).ok()?;
        let relative = normalize_relative(rel)?;
        let category = rel
            .parent()
            .and_then(Path::file_name)
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Some(Self {
            path: path.to_path_buf(),
            relative,
            category,
            kind,
        })
    }

    /// Clave estable del historial.
    pub fn key(&self) -> &str {
        &self.relative
    }

    /// Directorio relativo que se replica en cada raíz de salida.
    pub fn relative_dir(&self) -> PathBuf {
        Path::new(&self.relative)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// `{stem}.txt`, el nombre de todos los artefactos del documento.
    pub fn artifact_name(&self) -> String {
        let stem = Path::new(&self.relative)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{stem}.txt")
    }

    /// Tipo sugerido por la carpeta, si ésta es un identificador conocido.
    pub fn type_hint(&self) -> Option<DocumentType> {
        DocumentType::from_folder(&self.category)
    }
}

/// Convierte una ruta relativa en la cadena que se usa como clave: separador
/// `/`, sin componentes vacíos ni barra final. Rechaza rutas que escapen de
/// la raíz o contengan saltos de línea.
pub fn normalize_relative(rel: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    let key = parts.join("/");
    if key.is_empty() || key.contains('\n') || key.contains('\r') {
        return None;
    }
    Some(key)
}

/// Campos que se traducen por idioma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Title,
    Summary,
}

impl FieldKind {
    pub fn root(self) -> RootKind {
        match self {
            Self::Title => RootKind::Titles,
            Self::Summary => RootKind::Summary,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title => write!(f, "title"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

/// Idioma de destino: código corto (`pl`) y nombre que se pasa al traductor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    pub code: String,
    pub name: String,
}

impl Language {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

/// Raíces del árbol de salida.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    Content,
    Category,
    Type,
    Info,
    Titles,
    Summary,
}

impl RootKind {
    /// Raíces escritas con los datos canónicos, antes de traducir.
    pub const CANONICAL: [RootKind; 4] = [Self::Content, Self::Category, Self::Type, Self::Info];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Category => "category",
            Self::Type => "type",
            Self::Info => "info",
            Self::Titles => "titles",
            Self::Summary => "summary",
        }
    }

    /// Las raíces localizadas anidan un nivel más por código de idioma.
    pub fn is_localized(self) -> bool {
        matches!(self, Self::Titles | Self::Summary)
    }
}

/// Categoría de alto nivel a la que pertenece cada tipo de documento.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentCategory {
    Financial,
    Legal,
    Personal,
    Health,
    Property,
    Other,
}

impl DocumentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Financial => "financial",
            Self::Legal => "legal",
            Self::Personal => "personal",
            Self::Health => "health",
            Self::Property => "property",
            Self::Other => "other",
        }
    }
}

/// Catálogo consolidado de tipos de documento. Cada variante lleva como datos
/// su identificador de carpeta, su etiqueta legible y la pista que recibe el
/// modelo de extracción.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DocumentType {
    TaxDocument,
    Invoice,
    Receipt,
    UtilityBill,
    BankStatement,
    LoanAgreement,
    InsurancePolicy,
    NotarialDeed,
    CourtDocument,
    PowerOfAttorney,
    Contract,
    IdCard,
    Passport,
    BirthCertificate,
    MarriageCertificate,
    DeathCertificate,
    OfficialCertificate,
    DrivingLicense,
    EducationDocument,
    Cv,
    MedicalDocument,
    Prescription,
    Referral,
    VaccinationCard,
    SanitaryBooklet,
    PropertyDeed,
    RentalAgreement,
    VehicleDocument,
    TechnicalInspection,
    DocumentScan,
    Application,
    Certificate,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 33] = [
        Self::TaxDocument,
        Self::Invoice,
        Self::Receipt,
        Self::UtilityBill,
        Self::BankStatement,
        Self::LoanAgreement,
        Self::InsurancePolicy,
        Self::NotarialDeed,
        Self::CourtDocument,
        Self::PowerOfAttorney,
        Self::Contract,
        Self::IdCard,
        Self::Passport,
        Self::BirthCertificate,
        Self::MarriageCertificate,
        Self::DeathCertificate,
        Self::OfficialCertificate,
        Self::DrivingLicense,
        Self::EducationDocument,
        Self::Cv,
        Self::MedicalDocument,
        Self::Prescription,
        Self::Referral,
        Self::VaccinationCard,
        Self::SanitaryBooklet,
        Self::PropertyDeed,
        Self::RentalAgreement,
        Self::VehicleDocument,
        Self::TechnicalInspection,
        Self::DocumentScan,
        Self::Application,
        Self::Certificate,
        Self::Other,
    ];

    /// Identificador usado como nombre de carpeta y como etiqueta en `type/`.
    pub fn id(self) -> &'static str {
        match self {
            Self::TaxDocument => "taxDocument",
            Self::Invoice => "invoice",
            Self::Receipt => "receipt",
            Self::UtilityBill => "utilityBill",
            Self::BankStatement => "bankStatement",
            Self::LoanAgreement => "loanAgreement",
            Self::InsurancePolicy => "insurancePolicy",
            Self::NotarialDeed => "notarialDeed",
            Self::CourtDocument => "courtDocument",
            Self::PowerOfAttorney => "powerOfAttorney",
            Self::Contract => "contract",
            Self::IdCard => "idCard",
            Self::Passport => "passport",
            Self::BirthCertificate => "birthCertificate",
            Self::MarriageCertificate => "marriageCertificate",
            Self::DeathCertificate => "deathCertificate",
            Self::OfficialCertificate => "officialCertificate",
            Self::DrivingLicense => "drivingLicense",
            Self::EducationDocument => "educationDocument",
            Self::Cv => "cv",
            Self::MedicalDocument => "medicalDocument",
            Self::Prescription => "prescription",
            Self::Referral => "referral",
            Self::VaccinationCard => "vaccinationCard",
            Self::SanitaryBooklet => "sanitaryBooklet",
            Self::PropertyDeed => "propertyDeed",
            Self::RentalAgreement => "rentalAgreement",
            Self::VehicleDocument => "vehicleDocument",
            Self::TechnicalInspection => "technicalInspection",
            Self::DocumentScan => "documentScan",
            Self::Application => "application",
            Self::Certificate => "certificate",
            Self::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        self.details().0
    }

    /// Rasgos visibles que identifican el tipo; se envían como pista al modelo.
    pub fn hint(self) -> &'static str {
        self.details().1
    }

    pub fn category(self) -> DocumentCategory {
        use DocumentCategory::*;
        match self {
            Self::TaxDocument
            | Self::Invoice
            | Self::Receipt
            | Self::UtilityBill
            | Self::BankStatement
            | Self::LoanAgreement
            | Self::InsurancePolicy => Financial,
            Self::NotarialDeed | Self::CourtDocument | Self::PowerOfAttorney | Self::Contract => {
                Legal
            }
            Self::IdCard
            | Self::Passport
            | Self::BirthCertificate
            | Self::MarriageCertificate
            | Self::DeathCertificate
            | Self::OfficialCertificate
            | Self::DrivingLicense
            | Self::EducationDocument
            | Self::Cv => Personal,
            Self::MedicalDocument
            | Self::Prescription
            | Self::Referral
            | Self::VaccinationCard
            | Self::SanitaryBooklet => Health,
            Self::PropertyDeed
            | Self::RentalAgreement
            | Self::VehicleDocument
            | Self::TechnicalInspection => Property,
            Self::DocumentScan | Self::Application | Self::Certificate | Self::Other => Other,
        }
    }

    fn details(self) -> (&'static str, &'static str) {
        match self {
            Self::TaxDocument => ("Tax document", "Form symbol such as PIT-11, PIT-37, VAT-7 or CIT-8 in the header, taxpayer and payer data, income tables"),
            Self::Invoice => ("Invoice", "Word \"Invoice\" or \"Faktura\", net/VAT/gross columns, seller and buyer data"),
            Self::Receipt => ("Fiscal receipt", "Narrow fiscal printer slip, shop logo on top, tax rates at the bottom, date and time"),
            Self::UtilityBill => ("Utility bill", "Provider logo (power/gas/water/internet), usage chart, amount due, bank account"),
            Self::BankStatement => ("Bank statement", "Bank logo, list of operations with dates and amounts, opening and closing balance"),
            Self::LoanAgreement => ("Loan agreement", "Title \"Loan agreement\" or \"Credit agreement\", repayment schedule, bank stamps"),
            Self::InsurancePolicy => ("Insurance policy", "Title \"Policy\", policy number, insurance period, insured object"),
            Self::NotarialDeed => ("Notarial deed", "State emblem, notary seal, title \"Notarial Deed\", repertory number"),
            Self::CourtDocument => ("Court document", "Court name, case reference number, judgment or lawsuit header, parties"),
            Self::PowerOfAttorney => ("Power of attorney", "Title \"Power of attorney\" or \"Authorization\", principal and attorney data, signature"),
            Self::Contract => ("Contract", "Contract title, parties, scope of work or employment, remuneration, signatures"),
            Self::IdCard => ("Identity card", "Plastic card, face photo, state emblem, personal number"),
            Self::Passport => ("Passport", "Data page with photo, holograms, machine readable zone (<<<)"),
            Self::BirthCertificate => ("Birth certificate", "Civil registry extract, emblem, registry office stamp"),
            Self::MarriageCertificate => ("Marriage certificate", "Civil registry extract with spouses' data, registry office stamp"),
            Self::DeathCertificate => ("Death certificate", "Civil registry extract of death, registry office stamp"),
            Self::OfficialCertificate => ("Official certificate", "Plain official form confirming a registry entry, municipal stamp"),
            Self::DrivingLicense => ("Driving license", "Pink plastic card, photo, vehicle category icons"),
            Self::EducationDocument => ("Education document", "School certificate or diploma, guilloche background, grades or degree, institution seal"),
            Self::Cv => ("Curriculum vitae", "Personal data, work experience and education sections, skills list"),
            Self::MedicalDocument => ("Medical document", "Clinic header, diagnosis, test results or sick leave form, physician stamp"),
            Self::Prescription => ("Prescription", "Prescription form, drug names and dosage, prescription code, physician stamp"),
            Self::Referral => ("Referral", "Title \"Referral\", target specialist or examination, diagnosis code"),
            Self::VaccinationCard => ("Vaccination card", "Table of vaccines with dates and batch numbers, clinic stamps"),
            Self::SanitaryBooklet => ("Sanitary booklet", "Booklet with sanitary and epidemiological examination entries"),
            Self::PropertyDeed => ("Property deed", "Land registry extract or map, plot number, ownership section"),
            Self::RentalAgreement => ("Rental agreement", "Title \"Rental agreement\", landlord and tenant, rent amount, premises address"),
            Self::VehicleDocument => ("Vehicle document", "Registration certificate or vehicle history, VIN, plate number"),
            Self::TechnicalInspection => ("Technical inspection", "Vehicle inspection result, station stamp, next inspection date"),
            Self::DocumentScan => ("Document scan", "Generic scanned page without a recognizable form"),
            Self::Application => ("Application", "Application form addressed to an office, applicant data, request"),
            Self::Certificate => ("Certificate", "Generic certificate or attestation with issuer and holder"),
            Self::Other => ("Other", "Any document that does not fit the other types"),
        }
    }

    /// Resuelve un nombre de carpeta: primero los identificadores actuales y
    /// después los identificadores antiguos, más granulares.
    pub fn from_folder(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.id() == name)
            .or_else(|| Self::from_legacy_id(name))
    }

    fn from_legacy_id(name: &str) -> Option<Self> {
        let mapped = match name {
            "pit11" | "pit37" | "pit36" | "pit36L" | "pit28" | "pit38" | "pit39" | "pit5"
            | "pit8C" | "vat7" | "cit8" | "pcc3" => Self::TaxDocument,
            "proformaInvoice" => Self::Invoice,
            "employmentContract" | "mandateContract" | "taskContract" | "b2bContract"
            | "nonCompeteAgreement" => Self::Contract,
            "courtJudgment" | "lawsuit" => Self::CourtDocument,
            "peselConfirmation" => Self::OfficialCertificate,
            "schoolCertificate" | "universityDiploma" | "professionalCertificate" => {
                Self::EducationDocument
            }
            "sickLeave" | "medicalResults" | "medicalHistory" => Self::MedicalDocument,
            "landRegistry" | "landMap" => Self::PropertyDeed,
            "registrationCertificate" | "vehicleHistory" => Self::VehicleDocument,
            "authorization" => Self::Other,
            _ => return None,
        };
        Some(mapped)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Respuesta estructurada del modelo de análisis. Los textos base están en
/// el idioma canónico.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedMetadata {
    /// "[Specific Type] - [Entity] - [Date]"
    pub title_base: String,
    /// Resumen factual de unas cinco frases.
    pub summary_base: String,
    pub category: DocumentCategory,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    /// Detalles concretos: símbolo del formulario, proveedor, número de documento...
    pub info: String,
}

impl ExtractedMetadata {
    pub fn base_text(&self, field: FieldKind) -> &str {
        match field {
            FieldKind::Title => &self.title_base,
            FieldKind::Summary => &self.summary_base,
        }
    }
}

/// Resultado completo de la etapa de extracción para un documento.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub raw_text: String,
    pub metadata: ExtractedMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_paths_are_normalized() {
        let root = Path::new("/data/scans");
        let doc = Document::new(
            root,
            Path::new("/data/scans/invoice/2023/f-01.JPG"),
            DocumentKind::Image,
        )
        .unwrap();
        assert_eq!(doc.key(), "invoice/2023/f-01.JPG");
        assert_eq!(doc.category, "2023");
        assert_eq!(doc.relative_dir(), PathBuf::from("invoice/2023"));
        assert_eq!(doc.artifact_name(), "f-01.txt");
    }

    #[test]
    fn normalize_rejects_escaping_paths() {
        assert_eq!(normalize_relative(Path::new("./a/b.png")).as_deref(), Some("a/b.png"));
        assert!(normalize_relative(Path::new("../a.png")).is_none());
        assert!(normalize_relative(Path::new("")).is_none());
    }

    #[test]
    fn kinds_follow_extension() {
        assert_eq!(DocumentKind::from_path(Path::new("a.PDF")), Some(DocumentKind::Paged));
        assert_eq!(DocumentKind::from_path(Path::new("a.jpeg")), Some(DocumentKind::Image));
        assert_eq!(DocumentKind::from_path(Path::new("a.png")), Some(DocumentKind::Image));
        assert_eq!(DocumentKind::from_path(Path::new("a.txt")), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_path(Path::new("a.docx")), None);
        assert_eq!(DocumentKind::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn catalogue_ids_round_trip_through_folders() {
        for t in DocumentType::ALL {
            assert_eq!(DocumentType::from_folder(t.id()), Some(t));
            assert!(!t.label().is_empty());
            assert!(!t.hint().is_empty());
        }
        assert_eq!(DocumentType::from_folder("pit37"), Some(DocumentType::TaxDocument));
        assert_eq!(DocumentType::from_folder("landMap"), Some(DocumentType::PropertyDeed));
        assert_eq!(DocumentType::from_folder("holidayPhotos"), None);
    }

    #[test]
    fn metadata_uses_wire_names() {
        let json = r#"{"title_base":"Invoice - ACME - 2023","summary_base":"S.","category":"financial","type":"utilityBill","info":"Prąd"}"#;
        let meta: ExtractedMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.doc_type, DocumentType::UtilityBill);
        assert_eq!(meta.category, DocumentCategory::Financial);
        assert_eq!(meta.doc_type.category(), DocumentCategory::Financial);
    }
}
