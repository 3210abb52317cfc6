use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Select,
};

use crate::common::{Paginated, PaginationLimits, PaginationParams};
use crate::errors::{DbResultExt, ServiceError};

/// Helper for building filtered, ordered, paginated list queries
pub struct QueryBuilder<E: EntityTrait> {
    query: Select<E>,
}

impl<E: EntityTrait> Default for QueryBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityTrait> QueryBuilder<E> {
    pub fn new() -> Self {
        Self { query: E::find() }
    }

    /// Add a filter condition
    pub fn filter(mut self, condition: Condition) -> Self {
        self.query = self.query.filter(condition);
        self
    }

    /// Add ordering
    pub fn order_by<C>(mut self, column: C, desc: bool) -> Self
    where
        C: ColumnTrait,
    {
        self.query = if desc {
            self.query.order_by_desc(column)
        } else {
            self.query.order_by_asc(column)
        };
        self
    }

    /// Validates `params`, then counts and fetches one page.
    ///
    /// Nothing is sent to the store when the parameters are out of bounds.
    pub async fn fetch_page<C>(
        self,
        db: &C,
        params: PaginationParams,
        limits: &PaginationLimits,
    ) -> Result<Paginated<E::Model>, ServiceError>
    where
        C: ConnectionTrait,
        E::Model: Send + Sync + 'static,
    {
        params.validate(limits)?;

        let paginator = self.query.paginate(db, params.page_size);
        let total = paginator.num_items().await.db_context("counting rows")?;
        let items = paginator
            .fetch_page(params.page - 1)
            .await
            .db_context("fetching page")?;

        Ok(Paginated::new(items, total, params))
    }
}
