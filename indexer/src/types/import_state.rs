use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::range::{Range, RangeValue};

/// Coverage bookkeeping for one entity.
///
/// `covered_ranges` stays merged (sorted, non-overlapping) after every update and only
/// ever grows. `to_retry` may transiently overlap it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRanges<T> {
    pub covered_ranges: Vec<Range<T>>,
    pub to_retry: Vec<Range<T>>,
    pub last_import_date: DateTime<Utc>,
}

impl<T> ImportRanges<T> {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self { covered_ranges: Vec::new(), to_retry: Vec::new(), last_import_date: now }
    }
}

/// Payload shared by all block-ranged feeds of a product contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductImportData {
    pub product_id: String,
    pub chain: String,
    pub contract_address: String,
    pub contract_created_at_block: u64,
    pub contract_created_date: DateTime<Utc>,
    pub ranges: ImportRanges<u64>,
}

/// Payload of a date-ranged price feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceFeedImportData {
    pub price_feed_id: String,
    pub first_date: DateTime<Utc>,
    pub ranges: ImportRanges<DateTime<Utc>>,
}

/// What an import state tracks, discriminated by the persisted `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImportData {
    #[serde(rename = "product:investment")]
    ProductInvestment(ProductImportData),
    #[serde(rename = "product:share-rate")]
    ProductShareRate(ProductImportData),
    #[serde(rename = "product:rewards")]
    ProductRewards(ProductImportData),
    #[serde(rename = "oracle:price")]
    OraclePrice(PriceFeedImportData),
}

impl ImportData {
    /// Short name of the variant, matching the persisted discriminant.
    pub fn kind(&self) -> &'static str {
        match self {
            ImportData::ProductInvestment(_) => "product:investment",
            ImportData::ProductShareRate(_) => "product:share-rate",
            ImportData::ProductRewards(_) => "product:rewards",
            ImportData::OraclePrice(_) => "oracle:price",
        }
    }

    pub fn product(&self) -> Option<&ProductImportData> {
        match self {
            ImportData::ProductInvestment(data) | ImportData::ProductShareRate(data) | ImportData::ProductRewards(data) => {
                Some(data)
            }
            ImportData::OraclePrice(_) => None,
        }
    }

    pub fn last_import_date(&self) -> DateTime<Utc> {
        match self {
            ImportData::ProductInvestment(data) | ImportData::ProductShareRate(data) | ImportData::ProductRewards(data) => {
                data.ranges.last_import_date
            }
            ImportData::OraclePrice(data) => data.ranges.last_import_date,
        }
    }
}

/// Persisted record, one per tracked entity or feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportState {
    pub import_key: String,
    pub import_data: ImportData,
}

impl ImportState {
    pub fn new(import_key: impl Into<String>, import_data: ImportData) -> Self {
        Self { import_key: import_key.into(), import_data }
    }

    pub fn ranges<T: ImportRangeKind>(&self) -> Option<&ImportRanges<T>> {
        T::ranges(&self.import_data)
    }

    pub fn ranges_mut<T: ImportRangeKind>(&mut self) -> Option<&mut ImportRanges<T>> {
        T::ranges_mut(&mut self.import_data)
    }
}

/// Links a range value type to the import state variants that store it.
pub trait ImportRangeKind: RangeValue {
    /// Human readable name used in error messages.
    const NAME: &'static str;

    fn ranges(data: &ImportData) -> Option<&ImportRanges<Self>>;

    fn ranges_mut(data: &mut ImportData) -> Option<&mut ImportRanges<Self>>;
}

impl ImportRangeKind for u64 {
    const NAME: &'static str = "block";

    fn ranges(data: &ImportData) -> Option<&ImportRanges<Self>> {
        match data {
            ImportData::ProductInvestment(data) | ImportData::ProductShareRate(data) | ImportData::ProductRewards(data) => {
                Some(&data.ranges)
            }
            ImportData::OraclePrice(_) => None,
        }
    }

    fn ranges_mut(data: &mut ImportData) -> Option<&mut ImportRanges<Self>> {
        match data {
            ImportData::ProductInvestment(data) | ImportData::ProductShareRate(data) | ImportData::ProductRewards(data) => {
                Some(&mut data.ranges)
            }
            ImportData::OraclePrice(_) => None,
        }
    }
}

impl ImportRangeKind for DateTime<Utc> {
    const NAME: &'static str = "date";

    fn ranges(data: &ImportData) -> Option<&ImportRanges<Self>> {
        match data {
            ImportData::OraclePrice(data) => Some(&data.ranges),
            ImportData::ProductInvestment(_) | ImportData::ProductShareRate(_) | ImportData::ProductRewards(_) => None,
        }
    }

    fn ranges_mut(data: &mut ImportData) -> Option<&mut ImportRanges<Self>> {
        match data {
            ImportData::OraclePrice(data) => Some(&mut data.ranges),
            ImportData::ProductInvestment(_) | ImportData::ProductShareRate(_) | ImportData::ProductRewards(_) => None,
        }
    }
}
