use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use wayfare_booking::models::{
    AirlineChange, Booking, BookingUpdate, CancellationRecord, ContactInfo, Itinerary, PricingSnapshot,
    TicketDocument,
};
use wayfare_booking::repository::{BookingRepository, StoreError, VersionedWrite};
use wayfare_shared::Masked;

const SELECT_BOOKING: &str = r#"
    SELECT id, reference, provider_order_id, pnr, status, payment_status, payment_deadline,
           payment_intent_id, contact_email, contact_phone, pricing, itinerary, documents,
           airline_change, cancellation, admin_notes, requires_review, last_synced_at,
           version, created_at, updated_at
    FROM bookings
"#;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<Booking>, StoreError> {
        let sql = format!("{} WHERE {}", SELECT_BOOKING, clause);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(Booking::try_from).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    provider_order_id: Option<String>,
    pnr: Option<String>,
    status: String,
    payment_status: String,
    payment_deadline: Option<DateTime<Utc>>,
    payment_intent_id: Option<String>,
    contact_email: String,
    contact_phone: Option<String>,
    pricing: Json<PricingSnapshot>,
    itinerary: Json<Itinerary>,
    documents: Json<Vec<TicketDocument>>,
    airline_change: Option<Json<AirlineChange>>,
    cancellation: Option<Json<CancellationRecord>>,
    admin_notes: Option<String>,
    requires_review: bool,
    last_synced_at: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            reference: row.reference,
            provider_order_id: row.provider_order_id,
            pnr: row.pnr,
            status: row.status.parse().map_err(StoreError::Backend)?,
            payment_status: row.payment_status.parse().map_err(StoreError::Backend)?,
            payment_deadline: row.payment_deadline,
            payment_intent_id: row.payment_intent_id,
            contact: ContactInfo {
                email: Masked::new(row.contact_email),
                phone: row.contact_phone.map(Masked::new),
            },
            pricing: row.pricing.0,
            itinerary: row.itinerary.0,
            documents: row.documents.0,
            airline_change: row.airline_change.map(|j| j.0),
            cancellation: row.cancellation.map(|j| j.0),
            admin_notes: row.admin_notes,
            requires_review: row.requires_review,
            last_synced_at: row.last_synced_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Unique violations surface as `Duplicate` naming the field
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some(c) if c.contains("pnr") => "pnr",
                Some(c) if c.contains("provider_order") => "provider_order_id",
                Some(c) if c.contains("reference") => "reference",
                _ => "unknown",
            };
            return StoreError::Duplicate(field.to_string());
        }
    }
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let sql = format!("{} WHERE id = $1", SELECT_BOOKING);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>, StoreError> {
        self.fetch_one_where("reference = $1", reference).await
    }

    async fn find_by_provider_order(&self, order_id: &str) -> Result<Option<Booking>, StoreError> {
        self.fetch_one_where("provider_order_id = $1", order_id).await
    }

    async fn find_by_pnr(&self, pnr: &str) -> Result<Option<Booking>, StoreError> {
        self.fetch_one_where("UPPER(pnr) = UPPER($1)", pnr).await
    }

    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, reference, provider_order_id, pnr, status, payment_status, payment_deadline,
                payment_intent_id, contact_email, contact_phone, pricing, itinerary, documents,
                airline_change, cancellation, admin_notes, requires_review, last_synced_at,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(&booking.provider_order_id)
        .bind(&booking.pnr)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.payment_deadline)
        .bind(&booking.payment_intent_id)
        .bind(booking.contact.email.expose())
        .bind(booking.contact.phone.as_ref().map(|p| p.expose().clone()))
        .bind(Json(&booking.pricing))
        .bind(Json(&booking.itinerary))
        .bind(Json(&booking.documents))
        .bind(booking.airline_change.as_ref().map(Json))
        .bind(booking.cancellation.as_ref().map(Json))
        .bind(&booking.admin_notes)
        .bind(booking.requires_review)
        .bind(booking.last_synced_at)
        .bind(booking.version)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        tracing::debug!(booking_id = %booking.id, reference = %booking.reference, "Booking inserted");
        Ok(())
    }

    async fn update_if_version(
        &self,
        id: Uuid,
        expected_version: i64,
        update: &BookingUpdate,
    ) -> Result<VersionedWrite, StoreError> {
        let mut booking = match self.get(id).await? {
            Some(b) => b,
            None => return Err(StoreError::NotFound(id.to_string())),
        };
        if booking.version != expected_version {
            return Ok(VersionedWrite::Stale);
        }

        booking.apply(update, Utc::now());
        booking.version = expected_version + 1;

        // The version predicate makes this a compare-and-swap
        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                status = $3, payment_status = $4, pnr = $5, payment_deadline = $6,
                payment_intent_id = $7, documents = $8, airline_change = $9, cancellation = $10,
                admin_notes = $11, requires_review = $12, last_synced_at = $13,
                version = $14, updated_at = $15
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(&booking.pnr)
        .bind(booking.payment_deadline)
        .bind(&booking.payment_intent_id)
        .bind(Json(&booking.documents))
        .bind(booking.airline_change.as_ref().map(Json))
        .bind(booking.cancellation.as_ref().map(Json))
        .bind(&booking.admin_notes)
        .bind(booking.requires_review)
        .bind(booking.last_synced_at)
        .bind(booking.version)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Ok(VersionedWrite::Stale);
        }
        Ok(VersionedWrite::Applied(booking))
    }
}
