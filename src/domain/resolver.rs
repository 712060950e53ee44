//! Coingecko id proposals for held assets that have none.
//!
//! Proposals are read-only; an operator applies them by re-importing.

use serde::Serialize;

use crate::domain::error::BalancerError;
use crate::domain::market::SearchCoin;
use crate::ports::market_port::MarketDataPort;
use crate::ports::store_port::StorePort;

pub const MAX_CANDIDATES: usize = 5;
pub const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Proposal {
    pub symbol: String,
    pub name: String,
    pub current_coingecko_id: Option<String>,
    pub candidates: Vec<SearchCoin>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolution {
    pub count: usize,
    pub proposals: Vec<Proposal>,
}

/// Orders search hits by exact symbol match, exact name match, then market
/// cap rank (unranked last) and keeps the first few.
pub fn pick_candidates(mut coins: Vec<SearchCoin>, symbol: &str, name: &str) -> Vec<SearchCoin> {
    let matches = |field: &Option<String>, want: &str| {
        field
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case(want))
    };
    coins.sort_by_key(|c| {
        (
            !matches(&c.symbol, symbol),
            !matches(&c.name, name),
            c.market_cap_rank.unwrap_or(1_000_000),
        )
    });
    coins.truncate(MAX_CANDIDATES);
    coins
}

pub fn resolve_missing(
    store: &dyn StorePort,
    market: &dyn MarketDataPort,
    limit: usize,
) -> Result<Resolution, BalancerError> {
    let mut proposals = Vec::new();
    for asset in store.unmapped_held_assets(limit)? {
        let query = if asset.symbol.is_empty() { &asset.name } else { &asset.symbol };
        if query.is_empty() {
            continue;
        }
        let hits = market.search(query).unwrap_or_else(|e| {
            log::warn!("search for {query} failed: {e}");
            Vec::new()
        });
        proposals.push(Proposal {
            candidates: pick_candidates(hits, &asset.symbol, &asset.name),
            symbol: asset.symbol,
            name: asset.name,
            current_coingecko_id: asset.coingecko_id,
        });
    }
    Ok(Resolution {
        count: proposals.len(),
        proposals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(id: &str, symbol: &str, name: &str, rank: Option<i64>) -> SearchCoin {
        SearchCoin {
            id: Some(id.into()),
            symbol: Some(symbol.into()),
            name: Some(name.into()),
            api_symbol: Some(id.into()),
            market_cap_rank: rank,
            score: None,
        }
    }

    #[test]
    fn exact_symbol_then_name_then_rank() {
        let picked = pick_candidates(
            vec![
                coin("a", "ABC", "Alpha", Some(1)),
                coin("b", "xyz", "Other", None),
                coin("c", "XYZ", "Xyz Token", Some(500)),
                coin("d", "XYZ", "Other", Some(20)),
            ],
            "XYZ",
            "Xyz Token",
        );
        let ids: Vec<_> = picked.iter().map(|c| c.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["c", "d", "b", "a"]);
    }

    #[test]
    fn keeps_top_five() {
        let many = (0..8).map(|i| coin(&i.to_string(), "Q", "Q", Some(i))).collect();
        assert_eq!(pick_candidates(many, "Q", "Q").len(), 5);
    }
}
