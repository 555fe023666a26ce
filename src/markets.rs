//! Market Book
//! Mission: Market metadata and the open -> closed -> settled lifecycle
//!
//! Mutations are admin-only. Settlement itself lives in `settlement`; this module only
//! exposes the status read and the one-shot settled transition it relies on.

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{LedgerStore, MarketQuery, UnitOfWork};
use crate::models::{validate_page, Actor, Market, MarketStatus, Outcome, Page};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMarket {
    pub title: String,
    pub description: String,
    pub category: String,
    pub end_date: DateTime<Utc>,
}

impl NewMarket {
    fn normalized(self, now: DateTime<Utc>) -> LedgerResult<NewMarket> {
        let title = self.title.trim().to_string();
        let description = self.description.trim().to_string();
        let category = self.category.trim().to_lowercase();

        if title.is_empty() {
            return Err(LedgerError::validation("title: is required"));
        }
        if description.is_empty() {
            return Err(LedgerError::validation("description: is required"));
        }
        if category.is_empty() {
            return Err(LedgerError::validation("category: is required"));
        }
        if self.end_date <= now {
            return Err(LedgerError::validation("endDate: must be in the future"));
        }

        Ok(NewMarket {
            title,
            description,
            category,
            end_date: self.end_date,
        })
    }
}

#[derive(Clone)]
pub struct MarketBook {
    store: LedgerStore,
}

impl MarketBook {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    pub fn create(&self, actor: &Actor, request: NewMarket) -> LedgerResult<Market> {
        actor.require_admin()?;
        let request = request.normalized(Utc::now())?;

        let market = self.store.unit_of_work(|uow| {
            let market = Market {
                id: Uuid::new_v4(),
                title: request.title,
                description: request.description,
                category: request.category,
                status: MarketStatus::Open,
                end_date: request.end_date,
                winning_outcome: None,
                settled_at: None,
                created_at: uow.now(),
            };
            uow.insert_market(&market)?;
            Ok(market)
        })?;

        info!(
            market_id = %market.id,
            title = %market.title,
            category = %market.category,
            "Market created"
        );
        Ok(market)
    }

    pub fn get(&self, market_id: Uuid) -> LedgerResult<Market> {
        self.store.read(|uow| uow.market(market_id))
    }

    pub fn list(&self, mut query: MarketQuery) -> LedgerResult<Page<Market>> {
        validate_page(query.page, query.page_size)?;
        query.category = query
            .category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty());

        let (markets, total) = self.store.read(|uow| uow.markets(&query))?;
        Ok(Page::new(markets, query.page, query.page_size, total))
    }

    /// Stop accepting stakes. Locked orders stay locked until settlement.
    pub fn close(&self, actor: &Actor, market_id: Uuid) -> LedgerResult<Market> {
        actor.require_admin()?;
        let market = self.store.unit_of_work(|uow| uow.close_market(market_id))?;
        info!(market_id = %market_id, "Market closed");
        Ok(market)
    }
}

/// Current status of a market, read inside the caller's unit of work.
pub fn market_status(uow: &UnitOfWork<'_>, market_id: Uuid) -> LedgerResult<MarketStatus> {
    Ok(uow.market(market_id)?.status)
}

/// One-shot transition to `settled`, recording the winning outcome.
pub fn set_market_settled(
    uow: &mut UnitOfWork<'_>,
    market_id: Uuid,
    winning: Outcome,
) -> LedgerResult<Market> {
    uow.settle_market(market_id, winning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Duration;

    fn admin() -> Actor {
        Actor::new(Uuid::new_v4(), Role::Admin)
    }

    fn new_market(title: &str, category: &str) -> NewMarket {
        NewMarket {
            title: title.to_string(),
            description: "Resolves on the official result".to_string(),
            category: category.to_string(),
            end_date: Utc::now() + Duration::days(3),
        }
    }

    #[test]
    fn test_create_requires_admin() {
        let book = MarketBook::new(LedgerStore::in_memory().unwrap());
        let user = Actor::new(Uuid::new_v4(), Role::User);
        let result = book.create(&user, new_market("Rain tomorrow?", "Weather"));
        assert!(matches!(result, Err(LedgerError::Forbidden)));
    }

    #[test]
    fn test_create_normalizes_and_rejects_duplicates() {
        let book = MarketBook::new(LedgerStore::in_memory().unwrap());
        let market = book
            .create(&admin(), new_market("  Rain tomorrow?  ", "Weather"))
            .unwrap();
        assert_eq!(market.title, "Rain tomorrow?");
        assert_eq!(market.category, "weather");
        assert_eq!(market.status, MarketStatus::Open);

        let dup = book.create(&admin(), new_market("Rain tomorrow?", "weather"));
        assert!(matches!(dup, Err(LedgerError::MarketExists)));
    }

    #[test]
    fn test_create_validates_fields() {
        let book = MarketBook::new(LedgerStore::in_memory().unwrap());

        let mut past = new_market("Past", "misc");
        past.end_date = Utc::now() - Duration::hours(1);
        assert!(matches!(
            book.create(&admin(), past),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            book.create(&admin(), new_market("  ", "misc")),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_list_filters_by_category_and_status() {
        let book = MarketBook::new(LedgerStore::in_memory().unwrap());
        let admin = admin();
        let first = book.create(&admin, new_market("Derby", "Sports")).unwrap();
        book.create(&admin, new_market("Cup final", "sports")).unwrap();
        book.create(&admin, new_market("Election", "politics")).unwrap();
        book.close(&admin, first.id).unwrap();

        let sports = book
            .list(MarketQuery {
                category: Some("SPORTS".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(sports.total, 2);
        assert!(!sports.has_more);

        let open_sports = book
            .list(MarketQuery {
                category: Some("sports".to_string()),
                status: Some(MarketStatus::Open),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(open_sports.total, 1);
        assert_eq!(open_sports.items[0].title, "Cup final");

        let bad = book.list(MarketQuery {
            page: 0,
            ..Default::default()
        });
        assert!(matches!(bad, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_close_twice() {
        let book = MarketBook::new(LedgerStore::in_memory().unwrap());
        let admin = admin();
        let market = book.create(&admin, new_market("Derby", "sports")).unwrap();
        assert_eq!(
            book.close(&admin, market.id).unwrap().status,
            MarketStatus::Closed
        );
        assert!(matches!(
            book.close(&admin, market.id),
            Err(LedgerError::MarketNotOpen)
        ));
        assert!(matches!(
            book.close(&admin, Uuid::new_v4()),
            Err(LedgerError::MarketNotFound)
        ));
    }
}
