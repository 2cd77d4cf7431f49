use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use stayhub::error::AppError;
use stayhub::lifecycle::{
    ApprovalStatus, CoordinatorError, MarketplaceStore, Property, PropertyId, PropertyStatus,
    UserId,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Listings used by `serve --seed-catalog` and the demo walkthrough.
pub(crate) fn sample_catalog() -> Vec<Property> {
    vec![
        listing(
            "prop-indiranagar-2bhk",
            "usr-owner-meera",
            "Indiranagar 2BHK near metro",
            28_000,
            ApprovalStatus::Approved,
        ),
        listing(
            "prop-whitefield-studio",
            "usr-owner-meera",
            "Whitefield studio with workspace",
            16_500,
            ApprovalStatus::Approved,
        ),
        listing(
            "prop-hsr-3bhk",
            "usr-owner-karthik",
            "HSR Layout 3BHK family home",
            41_000,
            ApprovalStatus::Pending,
        ),
    ]
}

fn listing(
    id: &str,
    owner: &str,
    title: &str,
    price: u64,
    approval_status: ApprovalStatus,
) -> Property {
    Property {
        id: PropertyId::from(id),
        owner_id: UserId::from(owner),
        title: title.to_string(),
        price,
        approval_status,
        status: PropertyStatus::Available,
    }
}

pub(crate) async fn seed_properties<S>(
    store: &S,
    properties: Vec<Property>,
) -> Result<usize, AppError>
where
    S: MarketplaceStore,
{
    let count = properties.len();
    for property in properties {
        store
            .save_property(property)
            .await
            .map_err(CoordinatorError::from)?;
    }
    Ok(count)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stayhub::lifecycle::InMemoryStore;

    #[test]
    fn parse_date_accepts_padded_iso_dates() {
        assert_eq!(
            parse_date(" 2024-03-10 "),
            Ok(NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date"))
        );
        let err = parse_date("10/03/2024").expect_err("slash dates rejected");
        assert!(err.contains("YYYY-MM-DD"));
    }

    #[tokio::test]
    async fn seed_properties_loads_the_catalog() {
        let store = InMemoryStore::new();
        let seeded = seed_properties(&store, sample_catalog())
            .await
            .expect("catalog seeds");
        assert_eq!(seeded, 3);

        let pending = store
            .property(&PropertyId::from("prop-hsr-3bhk"))
            .await
            .expect("store readable")
            .expect("property present");
        assert_eq!(pending.approval_status, ApprovalStatus::Pending);
    }
}
