use std::fmt;

use kma_client::domain::{ForecastItem, ForecastSlot, Region};

/// Why a region was left out of the run without querying the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingGridX,
    MissingGridY,
    MissingAdminCode,
    NoGenerationFacility,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::MissingGridX => "missing grid X",
            SkipReason::MissingGridY => "missing grid Y",
            SkipReason::MissingAdminCode => "missing administrative code",
            SkipReason::NoGenerationFacility => "no generation facility",
        };
        f.write_str(s)
    }
}

/// A region that passed the eligibility checks, with its admin code unwrapped.
#[derive(Debug, Clone, Copy)]
pub struct EligibleRegion<'a> {
    pub region: &'a Region,
    pub admin_code: &'a str,
}

/// Pure eligibility check of a reference row.
///
/// Rules, first failure wins:
/// - grid X and grid Y must be present.
/// - the administrative code must be present.
/// - the facility flag must not be the "absent" sentinel (a blank flag passes).
pub fn check_eligibility(region: &Region) -> Result<EligibleRegion<'_>, SkipReason> {
    if region.grid_x.is_none() {
        return Err(SkipReason::MissingGridX);
    }
    if region.grid_y.is_none() {
        return Err(SkipReason::MissingGridY);
    }
    let admin_code = region
        .admin_code
        .as_deref()
        .ok_or(SkipReason::MissingAdminCode)?;
    if region.has_no_facility() {
        return Err(SkipReason::NoGenerationFacility);
    }

    Ok(EligibleRegion { region, admin_code })
}

/// Merge every slot of one response with the region's static attributes,
/// keeping response order.
pub fn merge_slots(region: &Region, slots: Vec<ForecastSlot>) -> Vec<ForecastItem> {
    slots
        .into_iter()
        .map(|slot| ForecastItem::merge(region, slot))
        .collect()
}
