use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, NotSet, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::common::DocumentKind;
use crate::entities::contact::{self, Entity as Contact};
use crate::errors::{DbResultExt, ServiceError};

use super::{BaseRepository, Repository};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ContactInput {
    #[validate(length(min = 1, message = "Contact name is required"))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub company: Option<String>,
}

/// Reference data every document and process points at.
#[derive(Debug)]
pub struct ContactRepository {
    base: BaseRepository,
}

impl ContactRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db, Default::default()),
        }
    }

    #[instrument(skip(self, input))]
    pub async fn create(&self, input: ContactInput) -> Result<contact::Model, ServiceError> {
        input.validate()?;

        let model = contact::ActiveModel {
            id: NotSet,
            name: Set(input.name),
            email: Set(input.email),
            company: Set(input.company),
            created_at: Set(Utc::now()),
        }
        .insert(self.get_db())
        .await
        .db_context("creating contact")?;

        info!(contact_id = model.id, "Contact created");
        Ok(model)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<contact::Model, ServiceError> {
        Contact::find_by_id(id)
            .one(self.get_db())
            .await
            .db_context("loading contact")?
            .ok_or_else(|| ServiceError::not_found(DocumentKind::Contact, id))
    }
}

impl Repository for ContactRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}
