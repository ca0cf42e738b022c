//! Pre-built Test Fixtures
//!
//! Ready-to-use values for claim tests. They are fixed so assertions can
//! rely on exact amounts.

use chrono::NaiveDate;
use core_kernel::{
    AppointmentId, ClinicId, Currency, InsuranceOperatorId, Money, PatientInsuranceId, TenantId,
};
use domain_claims::ProcedureReference;
use rust_decimal_macros::dec;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// Reference price of an office consultation
    pub fn consultation_price() -> Money {
        Money::new(dec!(150.00), Currency::BRL)
    }

    /// Reference price of a complete blood count
    pub fn blood_count_price() -> Money {
        Money::new(dec!(12.50), Currency::BRL)
    }

    pub fn brl_zero() -> Money {
        Money::zero(Currency::BRL)
    }

    /// A USD amount for currency mismatch tests
    pub fn usd_100() -> Money {
        Money::new(dec!(100.00), Currency::USD)
    }
}

/// Fixture for procedure catalog entries
pub struct ProcedureFixtures;

impl ProcedureFixtures {
    pub const CONSULTATION_CODE: &'static str = "40101012";
    pub const BLOOD_COUNT_CODE: &'static str = "40304361";

    pub fn consultation() -> ProcedureReference {
        ProcedureReference {
            code: Self::CONSULTATION_CODE.to_string(),
            description: "Consulta em consultório".to_string(),
            reference_price: MoneyFixtures::consultation_price(),
        }
    }

    pub fn blood_count() -> ProcedureReference {
        ProcedureReference {
            code: Self::BLOOD_COUNT_CODE.to_string(),
            description: "Hemograma com contagem de plaquetas".to_string(),
            reference_price: MoneyFixtures::blood_count_price(),
        }
    }

    /// Every fixture procedure, for seeding a catalog
    pub fn catalog() -> Vec<ProcedureReference> {
        vec![Self::consultation(), Self::blood_count()]
    }
}

/// Fixture for dates
pub struct DateFixtures;

impl DateFixtures {
    /// Standard service date (Mar 15, 2024)
    pub fn service_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date")
    }
}

/// Fixture for identifiers
pub struct IdFixtures;

impl IdFixtures {
    pub fn tenant_id() -> TenantId {
        TenantId::new()
    }

    pub fn clinic_id() -> ClinicId {
        ClinicId::new()
    }

    pub fn operator_id() -> InsuranceOperatorId {
        InsuranceOperatorId::new()
    }

    pub fn appointment_id() -> AppointmentId {
        AppointmentId::new()
    }

    pub fn patient_insurance_id() -> PatientInsuranceId {
        PatientInsuranceId::new()
    }
}

/// Fixture for string data
pub struct StringFixtures;

impl StringFixtures {
    pub fn batch_number() -> &'static str {
        "LOTE-000001"
    }

    pub fn guide_number() -> &'static str {
        "G-0001"
    }

    pub fn xml_file_name() -> &'static str {
        "LOTE-000001.xml"
    }

    pub fn response_file_name() -> &'static str {
        "RESP-LOTE-000001.xml"
    }

    pub fn protocol_number() -> &'static str {
        "PROT-1"
    }

    pub fn gloss_reason() -> &'static str {
        "valor acima da tabela contratada"
    }
}
