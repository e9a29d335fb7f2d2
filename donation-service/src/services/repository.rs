use crate::models::{CachedToken, DonationTotal, Donor, InvoiceRecord, Transaction};
use crate::services::zoho::TokenStore;
use anyhow::Result;
use async_trait::async_trait;
use mongodb::options::{IndexOptions, ReplaceOptions, UpdateOptions};
use mongodb::{bson::doc, bson::Bson, Collection, Database, IndexModel};
use uuid::Uuid;

/// `_id` of the singleton running-total document.
pub const DONATION_TOTAL_ID: &str = "donations";

#[derive(Clone)]
pub struct DonationRepository {
    transaction_collection: Collection<Transaction>,
    total_collection: Collection<DonationTotal>,
    token_collection: Collection<CachedToken>,
    invoice_collection: Collection<InvoiceRecord>,
    user_collection: Collection<Donor>,
}

impl DonationRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            transaction_collection: db.collection("transactions"),
            total_collection: db.collection("donation_totals"),
            token_collection: db.collection("cached_tokens"),
            invoice_collection: db.collection("invoice_records"),
            user_collection: db.collection("users"),
        }
    }

    /// Initialize database indexes.
    ///
    /// `payment_id` is intentionally non-unique: a redelivered webhook
    /// produces a second ledger record, and operators use this index to
    /// find the replays.
    pub async fn init_indexes(&self) -> Result<()> {
        let payment_idx = IndexModel::builder()
            .keys(doc! { "payment_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_id_idx".to_string())
                    .build(),
            )
            .build();

        let status_idx = IndexModel::builder()
            .keys(doc! { "status": 1, "recorded_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("status_recorded_idx".to_string())
                    .build(),
            )
            .build();

        self.transaction_collection
            .create_indexes([payment_idx, status_idx], None)
            .await?;

        tracing::info!("Donation service indexes initialized");
        Ok(())
    }

    /// Append one verification attempt to the ledger.
    ///
    /// Success and failure alike: every HTTP call produces exactly one
    /// record, and nothing here ever deletes or rewrites one.
    pub async fn record(&self, transaction: Transaction) -> Result<Uuid> {
        let id = transaction.id;
        self.transaction_collection
            .insert_one(transaction, None)
            .await?;
        Ok(id)
    }

    /// Attach invoice details to an already-recorded transaction, at most
    /// once. Returns whether the attachment was applied.
    pub async fn attach_invoice(
        &self,
        id: Uuid,
        invoice_id: &str,
        invoice_url: &str,
    ) -> Result<bool> {
        let filter = doc! { "_id": id.to_string(), "invoice_id": Bson::Null };
        let update = doc! {
            "$set": {
                "invoice_id": invoice_id,
                "invoice_url": invoice_url,
            }
        };
        let result = self
            .transaction_collection
            .update_one(filter, update, None)
            .await?;
        Ok(result.modified_count > 0)
    }

    /// Atomically add to the public running total.
    ///
    /// Uses the store's `$inc` primitive so concurrent donations never lose
    /// updates; the singleton document is created on first use.
    pub async fn increment_total(&self, amount: f64) -> Result<()> {
        let options = UpdateOptions::builder().upsert(true).build();
        self.total_collection
            .update_one(
                doc! { "_id": DONATION_TOTAL_ID },
                doc! { "$inc": { "total_amount": amount } },
                options,
            )
            .await?;
        Ok(())
    }

    pub async fn current_total(&self) -> Result<f64> {
        let total = self
            .total_collection
            .find_one(doc! { "_id": DONATION_TOTAL_ID }, None)
            .await?;
        Ok(total.map(|t| t.total_amount).unwrap_or(0.0))
    }

    pub async fn find_donor(&self, user_id: &str) -> Result<Option<Donor>> {
        let donor = self
            .user_collection
            .find_one(doc! { "_id": user_id }, None)
            .await?;
        Ok(donor)
    }

    pub async fn save_invoice_record(&self, record: InvoiceRecord) -> Result<()> {
        self.invoice_collection.insert_one(record, None).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for DonationRepository {
    async fn load_token(&self) -> Result<Option<CachedToken>> {
        let token = self
            .token_collection
            .find_one(doc! { "_id": CachedToken::SINGLETON_ID }, None)
            .await?;
        Ok(token)
    }

    async fn save_token(&self, token: &CachedToken) -> Result<()> {
        // The one document this service overwrites in place.
        let options = ReplaceOptions::builder().upsert(true).build();
        self.token_collection
            .replace_one(
                doc! { "_id": CachedToken::SINGLETON_ID },
                token.clone(),
                options,
            )
            .await?;
        Ok(())
    }
}
