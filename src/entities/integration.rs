// 🔌 Integration Types - which external object a canonical record mirrors
//
// "A CSV-imported Salesforce lead is still a Salesforce lead"
//
// Every integration_type resolves to a BASE integration_type through a closed,
// explicit table (`IntegrationType::base`). CSV and spreadsheet imports share the
// field map, enrichment config and status settings of the live object kind.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PROVIDER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Salesforce,
    Pipedrive,
    Hubspot,
    Zoho,
    Dynamics,
    Sellsy,
    Bullhorn,
    /// Spreadsheet-backed pseudo-CRM
    GoogleSheets,
    /// Spreadsheet-backed pseudo-CRM
    Excel,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Salesforce => "salesforce",
            Provider::Pipedrive => "pipedrive",
            Provider::Hubspot => "hubspot",
            Provider::Zoho => "zoho",
            Provider::Dynamics => "dynamics",
            Provider::Sellsy => "sellsy",
            Provider::Bullhorn => "bullhorn",
            Provider::GoogleSheets => "google_sheets",
            Provider::Excel => "excel",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// OBJECT KIND
// ============================================================================

/// External object kind. One field map exists per (tenant, provider, kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Lead,
    Contact,
    Person,
    Candidate,
    Account,
    Company,
    Organization,
    Deal,
    Opportunity,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Lead => "lead",
            ObjectKind::Contact => "contact",
            ObjectKind::Person => "person",
            ObjectKind::Candidate => "candidate",
            ObjectKind::Account => "account",
            ObjectKind::Company => "company",
            ObjectKind::Organization => "organization",
            ObjectKind::Deal => "deal",
            ObjectKind::Opportunity => "opportunity",
        }
    }

    /// Name of the tenant's map for this kind (e.g. "lead_map")
    pub fn map_name(&self) -> String {
        format!("{}_map", self.as_str())
    }

    /// Kinds that represent the company side of a lead
    pub fn is_account_like(&self) -> bool {
        matches!(
            self,
            ObjectKind::Account | ObjectKind::Company | ObjectKind::Organization
        )
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// IMPORT SOURCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportSource {
    /// Mirrors a live record in the external system
    Live,
    /// Imported from a CSV file, no external record exists
    Csv,
    /// Imported from a spreadsheet, no external record exists
    Spreadsheet,
}

// ============================================================================
// INTEGRATION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationType {
    // Salesforce
    SalesforceLead,
    SalesforceContact,
    SalesforceAccount,
    SalesforceCsvLead,
    SalesforceCsvContact,
    SalesforceGoogleSheetLead,
    SalesforceGoogleSheetContact,

    // Pipedrive
    PipedrivePerson,
    PipedriveOrganization,
    PipedriveCsvPerson,
    PipedriveGoogleSheetPerson,

    // HubSpot
    HubspotContact,
    HubspotCompany,
    HubspotCsvContact,
    HubspotGoogleSheetContact,

    // Zoho
    ZohoLead,
    ZohoContact,
    ZohoAccount,
    ZohoCsvLead,
    ZohoCsvContact,
    ZohoGoogleSheetLead,
    ZohoGoogleSheetContact,

    // Dynamics
    DynamicsLead,
    DynamicsContact,
    DynamicsAccount,

    // Sellsy
    SellsyContact,
    SellsyCompany,
    SellsyCsvContact,
    SellsyGoogleSheetContact,

    // Bullhorn
    BullhornLead,
    BullhornContact,
    BullhornCandidate,
    BullhornAccount,
    BullhornCsvLead,
    BullhornCsvContact,
    BullhornCsvCandidate,
    BullhornGoogleSheetLead,
    BullhornGoogleSheetContact,
    BullhornGoogleSheetCandidate,

    // Spreadsheet pseudo-CRMs
    GoogleSheetsLead,
    GoogleSheetsAccount,
    ExcelLead,
    ExcelAccount,
}

impl IntegrationType {
    /// Every defined integration type
    pub const ALL: [IntegrationType; 43] = [
        IntegrationType::SalesforceLead,
        IntegrationType::SalesforceContact,
        IntegrationType::SalesforceAccount,
        IntegrationType::SalesforceCsvLead,
        IntegrationType::SalesforceCsvContact,
        IntegrationType::SalesforceGoogleSheetLead,
        IntegrationType::SalesforceGoogleSheetContact,
        IntegrationType::PipedrivePerson,
        IntegrationType::PipedriveOrganization,
        IntegrationType::PipedriveCsvPerson,
        IntegrationType::PipedriveGoogleSheetPerson,
        IntegrationType::HubspotContact,
        IntegrationType::HubspotCompany,
        IntegrationType::HubspotCsvContact,
        IntegrationType::HubspotGoogleSheetContact,
        IntegrationType::ZohoLead,
        IntegrationType::ZohoContact,
        IntegrationType::ZohoAccount,
        IntegrationType::ZohoCsvLead,
        IntegrationType::ZohoCsvContact,
        IntegrationType::ZohoGoogleSheetLead,
        IntegrationType::ZohoGoogleSheetContact,
        IntegrationType::DynamicsLead,
        IntegrationType::DynamicsContact,
        IntegrationType::DynamicsAccount,
        IntegrationType::SellsyContact,
        IntegrationType::SellsyCompany,
        IntegrationType::SellsyCsvContact,
        IntegrationType::SellsyGoogleSheetContact,
        IntegrationType::BullhornLead,
        IntegrationType::BullhornContact,
        IntegrationType::BullhornCandidate,
        IntegrationType::BullhornAccount,
        IntegrationType::BullhornCsvLead,
        IntegrationType::BullhornCsvContact,
        IntegrationType::BullhornCsvCandidate,
        IntegrationType::BullhornGoogleSheetLead,
        IntegrationType::BullhornGoogleSheetContact,
        IntegrationType::BullhornGoogleSheetCandidate,
        IntegrationType::GoogleSheetsLead,
        IntegrationType::GoogleSheetsAccount,
        IntegrationType::ExcelLead,
        IntegrationType::ExcelAccount,
    ];

    /// Normalize CSV / spreadsheet variants to the live object they stand for.
    ///
    /// Closed table: every variant is listed, live types map to themselves.
    pub fn base(self) -> IntegrationType {
        use IntegrationType::*;
        match self {
            SalesforceCsvLead | SalesforceGoogleSheetLead => SalesforceLead,
            SalesforceCsvContact | SalesforceGoogleSheetContact => SalesforceContact,
            PipedriveCsvPerson | PipedriveGoogleSheetPerson => PipedrivePerson,
            HubspotCsvContact | HubspotGoogleSheetContact => HubspotContact,
            ZohoCsvLead | ZohoGoogleSheetLead => ZohoLead,
            ZohoCsvContact | ZohoGoogleSheetContact => ZohoContact,
            SellsyCsvContact | SellsyGoogleSheetContact => SellsyContact,
            BullhornCsvLead | BullhornGoogleSheetLead => BullhornLead,
            BullhornCsvContact | BullhornGoogleSheetContact => BullhornContact,
            BullhornCsvCandidate | BullhornGoogleSheetCandidate => BullhornCandidate,

            SalesforceLead | SalesforceContact | SalesforceAccount => self,
            PipedrivePerson | PipedriveOrganization => self,
            HubspotContact | HubspotCompany => self,
            ZohoLead | ZohoContact | ZohoAccount => self,
            DynamicsLead | DynamicsContact | DynamicsAccount => self,
            SellsyContact | SellsyCompany => self,
            BullhornLead | BullhornContact | BullhornCandidate | BullhornAccount => self,
            GoogleSheetsLead | GoogleSheetsAccount | ExcelLead | ExcelAccount => self,
        }
    }

    pub fn source(self) -> ImportSource {
        use IntegrationType::*;
        match self {
            SalesforceCsvLead | SalesforceCsvContact | PipedriveCsvPerson | HubspotCsvContact
            | ZohoCsvLead | ZohoCsvContact | SellsyCsvContact | BullhornCsvLead
            | BullhornCsvContact | BullhornCsvCandidate => ImportSource::Csv,
            SalesforceGoogleSheetLead
            | SalesforceGoogleSheetContact
            | PipedriveGoogleSheetPerson
            | HubspotGoogleSheetContact
            | ZohoGoogleSheetLead
            | ZohoGoogleSheetContact
            | SellsyGoogleSheetContact
            | BullhornGoogleSheetLead
            | BullhornGoogleSheetContact
            | BullhornGoogleSheetCandidate => ImportSource::Spreadsheet,
            _ => ImportSource::Live,
        }
    }

    /// True when an external record exists that the engine may write to
    pub fn has_external_record(self) -> bool {
        self.source() == ImportSource::Live
    }

    pub fn provider(self) -> Provider {
        use IntegrationType::*;
        match self {
            SalesforceLead | SalesforceContact | SalesforceAccount | SalesforceCsvLead
            | SalesforceCsvContact | SalesforceGoogleSheetLead | SalesforceGoogleSheetContact => {
                Provider::Salesforce
            }
            PipedrivePerson | PipedriveOrganization | PipedriveCsvPerson
            | PipedriveGoogleSheetPerson => Provider::Pipedrive,
            HubspotContact | HubspotCompany | HubspotCsvContact | HubspotGoogleSheetContact => {
                Provider::Hubspot
            }
            ZohoLead | ZohoContact | ZohoAccount | ZohoCsvLead | ZohoCsvContact
            | ZohoGoogleSheetLead | ZohoGoogleSheetContact => Provider::Zoho,
            DynamicsLead | DynamicsContact | DynamicsAccount => Provider::Dynamics,
            SellsyContact | SellsyCompany | SellsyCsvContact | SellsyGoogleSheetContact => {
                Provider::Sellsy
            }
            BullhornLead | BullhornContact | BullhornCandidate | BullhornAccount
            | BullhornCsvLead | BullhornCsvContact | BullhornCsvCandidate
            | BullhornGoogleSheetLead | BullhornGoogleSheetContact
            | BullhornGoogleSheetCandidate => Provider::Bullhorn,
            GoogleSheetsLead | GoogleSheetsAccount => Provider::GoogleSheets,
            ExcelLead | ExcelAccount => Provider::Excel,
        }
    }

    /// Object kind of the base type, selects the tenant's field map
    pub fn object_kind(self) -> ObjectKind {
        use IntegrationType::*;
        match self {
            SalesforceLead | SalesforceCsvLead | SalesforceGoogleSheetLead | ZohoLead
            | ZohoCsvLead | ZohoGoogleSheetLead | DynamicsLead | BullhornLead
            | BullhornCsvLead | BullhornGoogleSheetLead | GoogleSheetsLead | ExcelLead => {
                ObjectKind::Lead
            }
            SalesforceContact | SalesforceCsvContact | SalesforceGoogleSheetContact
            | HubspotContact | HubspotCsvContact | HubspotGoogleSheetContact | ZohoContact
            | ZohoCsvContact | ZohoGoogleSheetContact | DynamicsContact | SellsyContact
            | SellsyCsvContact | SellsyGoogleSheetContact | BullhornContact
            | BullhornCsvContact | BullhornGoogleSheetContact => ObjectKind::Contact,
            PipedrivePerson | PipedriveCsvPerson | PipedriveGoogleSheetPerson => {
                ObjectKind::Person
            }
            BullhornCandidate | BullhornCsvCandidate | BullhornGoogleSheetCandidate => {
                ObjectKind::Candidate
            }
            SalesforceAccount | ZohoAccount | DynamicsAccount | BullhornAccount
            | GoogleSheetsAccount | ExcelAccount => ObjectKind::Account,
            HubspotCompany | SellsyCompany => ObjectKind::Company,
            PipedriveOrganization => ObjectKind::Organization,
        }
    }

    /// Account-side integration type paired with a lead-side one
    pub fn account_type(self) -> IntegrationType {
        use IntegrationType::*;
        match self.provider() {
            Provider::Salesforce => SalesforceAccount,
            Provider::Pipedrive => PipedriveOrganization,
            Provider::Hubspot => HubspotCompany,
            Provider::Zoho => ZohoAccount,
            Provider::Dynamics => DynamicsAccount,
            Provider::Sellsy => SellsyCompany,
            Provider::Bullhorn => BullhornAccount,
            Provider::GoogleSheets => GoogleSheetsAccount,
            Provider::Excel => ExcelAccount,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use IntegrationType::*;
        match self {
            SalesforceLead => "salesforce_lead",
            SalesforceContact => "salesforce_contact",
            SalesforceAccount => "salesforce_account",
            SalesforceCsvLead => "salesforce_csv_lead",
            SalesforceCsvContact => "salesforce_csv_contact",
            SalesforceGoogleSheetLead => "salesforce_google_sheet_lead",
            SalesforceGoogleSheetContact => "salesforce_google_sheet_contact",
            PipedrivePerson => "pipedrive_person",
            PipedriveOrganization => "pipedrive_organization",
            PipedriveCsvPerson => "pipedrive_csv_person",
            PipedriveGoogleSheetPerson => "pipedrive_google_sheet_person",
            HubspotContact => "hubspot_contact",
            HubspotCompany => "hubspot_company",
            HubspotCsvContact => "hubspot_csv_contact",
            HubspotGoogleSheetContact => "hubspot_google_sheet_contact",
            ZohoLead => "zoho_lead",
            ZohoContact => "zoho_contact",
            ZohoAccount => "zoho_account",
            ZohoCsvLead => "zoho_csv_lead",
            ZohoCsvContact => "zoho_csv_contact",
            ZohoGoogleSheetLead => "zoho_google_sheet_lead",
            ZohoGoogleSheetContact => "zoho_google_sheet_contact",
            DynamicsLead => "dynamics_lead",
            DynamicsContact => "dynamics_contact",
            DynamicsAccount => "dynamics_account",
            SellsyContact => "sellsy_contact",
            SellsyCompany => "sellsy_company",
            SellsyCsvContact => "sellsy_csv_contact",
            SellsyGoogleSheetContact => "sellsy_google_sheet_contact",
            BullhornLead => "bullhorn_lead",
            BullhornContact => "bullhorn_contact",
            BullhornCandidate => "bullhorn_candidate",
            BullhornAccount => "bullhorn_account",
            BullhornCsvLead => "bullhorn_csv_lead",
            BullhornCsvContact => "bullhorn_csv_contact",
            BullhornCsvCandidate => "bullhorn_csv_candidate",
            BullhornGoogleSheetLead => "bullhorn_google_sheet_lead",
            BullhornGoogleSheetContact => "bullhorn_google_sheet_contact",
            BullhornGoogleSheetCandidate => "bullhorn_google_sheet_candidate",
            GoogleSheetsLead => "google_sheets_lead",
            GoogleSheetsAccount => "google_sheets_account",
            ExcelLead => "excel_lead",
            ExcelAccount => "excel_account",
        }
    }
}

impl fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationType {
    type Err = String;

    /// Accepts both "salesforce_lead" and "salesforce-lead"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        IntegrationType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("Unknown integration type: {}", s))
    }
}

// ============================================================================
// TESTS
// ============================================================================
