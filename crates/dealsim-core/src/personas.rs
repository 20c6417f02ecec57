//! Built-in customer personas and persona selection.

use std::collections::HashSet;

use crate::error::{SimError, SimResult};
use crate::model::Persona;

/// The default persona catalogue.
pub fn builtin() -> Vec<Persona> {
    vec![
        Persona::new(
            "budget-conscious",
            "Very price-sensitive, needs to stay within a strict budget. Asks about \
             financing options and wants to see the best value. Hesitant about extra \
             features that add cost.",
        ),
        Persona::new(
            "urgent-buyer",
            "Needs a car this week for a new job starting Monday. Expresses urgency and \
             time pressure, wants to move quickly and may pay slightly more for immediate \
             availability. Shows stress and needs reassurance.",
        ),
        Persona::new(
            "first-time-buyer",
            "First-time car buyer, unsure about needs and preferences. Asks many questions \
             and needs guidance about cars, financing and the buying process. Can feel \
             overwhelmed. Looking for a reliable, safe vehicle for daily commuting.",
        ),
    ]
}

/// Restrict `catalogue` to `filter` (all personas when the filter is empty),
/// keeping catalogue order.
pub fn select(catalogue: &[Persona], filter: &[String]) -> SimResult<Vec<Persona>> {
    if filter.is_empty() {
        return Ok(catalogue.to_vec());
    }

    let known: HashSet<&str> = catalogue.iter().map(|p| p.id.as_str()).collect();
    if let Some(unknown) = filter.iter().find(|id| !known.contains(id.as_str())) {
        return Err(SimError::config(format!("unknown persona id: {unknown}")));
    }

    Ok(catalogue
        .iter()
        .filter(|p| filter.iter().any(|id| id == &p.id))
        .cloned()
        .collect())
}

pub fn find<'a>(catalogue: &'a [Persona], id: &str) -> SimResult<&'a Persona> {
    catalogue
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| SimError::config(format!("unknown persona id: {id}")))
}
