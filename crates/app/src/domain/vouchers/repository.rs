//! Vouchers Repository

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use rustc_hash::FxHashSet;
use sqlx::{
    FromRow, Postgres, Row, Transaction,
    postgres::{PgArguments, PgRow},
    query, query_as, query_scalar,
    query::QueryAs,
    types::Json,
};
use uuid::Uuid;
use vouchers::{
    conditions::{TimeRestrictions, UserConditions},
    ids::{StoreUuid, TypedUuid, UserUuid, VoucherUuid},
    lifecycle::VoucherStatus,
    voucher::{
        Applicability, CollectionType, DiscountKind, DiscountTerms, Voucher, VoucherCode,
        VoucherScope, VoucherTerms,
    },
};

use crate::{
    database::{
        try_i64_from_u64, try_optional_i64_from_u64, try_optional_u64_from_i64, try_u64_from_i64,
    },
    domain::vouchers::{
        documents::{TimeRestrictionsDocument, UserConditionsDocument, typed},
        records::VoucherRecord,
    },
};

const CREATE_VOUCHER_SQL: &str = include_str!("sql/create_voucher.sql");
const GET_VOUCHER_SQL: &str = include_str!("sql/get_voucher.sql");
const LOCK_VOUCHER_SQL: &str = include_str!("sql/lock_voucher.sql");
const FIND_VOUCHER_BY_CODE_SQL: &str = include_str!("sql/find_voucher_by_code.sql");
const UPDATE_VOUCHER_SQL: &str = include_str!("sql/update_voucher.sql");
const SET_VOUCHER_STATUS_SQL: &str = include_str!("sql/set_voucher_status.sql");
const COUNT_VOUCHER_USAGES_SQL: &str = include_str!("sql/count_voucher_usages.sql");
const DELETE_VOUCHER_SQL: &str = include_str!("sql/delete_voucher.sql");
const LIST_AVAILABLE_VOUCHERS_SQL: &str = include_str!("sql/list_available_vouchers.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgVouchersRepository;

impl PgVouchersRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn create_voucher(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: VoucherUuid,
        code: &VoucherCode,
        status: VoucherStatus,
        created_by: UserUuid,
        terms: &VoucherTerms,
    ) -> Result<VoucherRecord, sqlx::Error> {
        let row = TermsRow::try_from(terms)?;

        let query = query_as::<Postgres, VoucherRecord>(CREATE_VOUCHER_SQL)
            .bind(uuid.into_uuid())
            .bind(code.as_str())
            .bind(terms.scope.store().map(StoreUuid::into_uuid))
            .bind(created_by.into_uuid())
            .bind(status.as_str());

        row.bind(query).fetch_one(&mut **tx).await
    }

    pub(crate) async fn get_voucher(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: VoucherUuid,
    ) -> Result<Option<VoucherRecord>, sqlx::Error> {
        query_as::<Postgres, VoucherRecord>(GET_VOUCHER_SQL)
            .bind(uuid.into_uuid())
            .fetch_optional(&mut **tx)
            .await
    }

    /// Fetch a voucher and hold its row lock until `tx` ends.
    ///
    /// Every counter mutation takes this lock first, which serialises competing
    /// redemptions and collections of the same voucher.
    pub(crate) async fn lock_voucher(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: VoucherUuid,
    ) -> Result<Option<VoucherRecord>, sqlx::Error> {
        query_as::<Postgres, VoucherRecord>(LOCK_VOUCHER_SQL)
            .bind(uuid.into_uuid())
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn find_by_code(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        code: &VoucherCode,
    ) -> Result<Option<VoucherRecord>, sqlx::Error> {
        query_as::<Postgres, VoucherRecord>(FIND_VOUCHER_BY_CODE_SQL)
            .bind(code.as_str())
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn update_terms(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: VoucherUuid,
        status: VoucherStatus,
        terms: &VoucherTerms,
    ) -> Result<VoucherRecord, sqlx::Error> {
        let row = TermsRow::try_from(terms)?;

        let query = query_as::<Postgres, VoucherRecord>(UPDATE_VOUCHER_SQL)
            .bind(uuid.into_uuid())
            .bind(status.as_str());

        row.bind(query).fetch_one(&mut **tx).await
    }

    pub(crate) async fn set_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: VoucherUuid,
        status: VoucherStatus,
    ) -> Result<VoucherRecord, sqlx::Error> {
        query_as::<Postgres, VoucherRecord>(SET_VOUCHER_STATUS_SQL)
            .bind(uuid.into_uuid())
            .bind(status.as_str())
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn count_usages(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: VoucherUuid,
    ) -> Result<u64, sqlx::Error> {
        let count: i64 = query_scalar(COUNT_VOUCHER_USAGES_SQL)
            .bind(uuid.into_uuid())
            .fetch_one(&mut **tx)
            .await?;

        try_u64_from_i64(count, "count")
    }

    pub(crate) async fn delete_voucher(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: VoucherUuid,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(DELETE_VOUCHER_SQL)
            .bind(uuid.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    /// Active vouchers within their window that `user` still has uses of.
    ///
    /// With a `store`, only vouchers usable there are returned.
    pub(crate) async fn list_available(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserUuid,
        store: Option<StoreUuid>,
        now: Timestamp,
    ) -> Result<Vec<VoucherRecord>, sqlx::Error> {
        query_as::<Postgres, VoucherRecord>(LIST_AVAILABLE_VOUCHERS_SQL)
            .bind(SqlxTimestamp::from(now))
            .bind(user.into_uuid())
            .bind(store.map(StoreUuid::into_uuid))
            .fetch_all(&mut **tx)
            .await
    }
}

/// Bind values for the editable terms, in column order.
struct TermsRow {
    discount_kind: &'static str,
    discount_value: i64,
    max_discount_amount: Option<i64>,
    min_order_amount: Option<i64>,
    starts_at: SqlxTimestamp,
    ends_at: SqlxTimestamp,
    total_usage_limit: Option<i64>,
    per_user_limit: i64,
    collection_limit: Option<i64>,
    collection_type: &'static str,
    priority: i32,
    stackable: bool,
    new_user_only: bool,
    applicable_store_uuids: Vec<Uuid>,
    applicable_category_uuids: Vec<Uuid>,
    applicable_product_uuids: Vec<Uuid>,
    excluded_product_uuids: Vec<Uuid>,
    user_conditions: Option<Json<UserConditionsDocument>>,
    time_restrictions: Option<Json<TimeRestrictionsDocument>>,
}

impl TermsRow {
    fn bind<'q, O>(
        self,
        query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> QueryAs<'q, Postgres, O, PgArguments> {
        query
            .bind(self.discount_kind)
            .bind(self.discount_value)
            .bind(self.max_discount_amount)
            .bind(self.min_order_amount)
            .bind(self.starts_at)
            .bind(self.ends_at)
            .bind(self.total_usage_limit)
            .bind(self.per_user_limit)
            .bind(self.collection_limit)
            .bind(self.collection_type)
            .bind(self.priority)
            .bind(self.stackable)
            .bind(self.new_user_only)
            .bind(self.applicable_store_uuids)
            .bind(self.applicable_category_uuids)
            .bind(self.applicable_product_uuids)
            .bind(self.excluded_product_uuids)
            .bind(self.user_conditions)
            .bind(self.time_restrictions)
    }
}

impl TryFrom<&VoucherTerms> for TermsRow {
    type Error = sqlx::Error;

    fn try_from(terms: &VoucherTerms) -> Result<Self, Self::Error> {
        Ok(Self {
            discount_kind: terms.discount.kind.as_str(),
            discount_value: try_i64_from_u64(terms.discount.value, "discount_value")?,
            max_discount_amount: try_optional_i64_from_u64(
                terms.discount.max_discount_amount,
                "max_discount_amount",
            )?,
            min_order_amount: try_optional_i64_from_u64(
                terms.min_order_amount,
                "min_order_amount",
            )?,
            starts_at: SqlxTimestamp::from(terms.starts_at),
            ends_at: SqlxTimestamp::from(terms.ends_at),
            total_usage_limit: try_optional_i64_from_u64(
                terms.total_usage_limit,
                "total_usage_limit",
            )?,
            per_user_limit: try_i64_from_u64(terms.per_user_limit, "per_user_limit")?,
            collection_limit: try_optional_i64_from_u64(
                terms.collection_limit,
                "collection_limit",
            )?,
            collection_type: terms.collection_type.as_str(),
            priority: terms.priority,
            stackable: terms.stackable,
            new_user_only: terms.new_user_only,
            applicable_store_uuids: untyped(&terms.applicability.stores),
            applicable_category_uuids: untyped(&terms.applicability.categories),
            applicable_product_uuids: untyped(&terms.applicability.products),
            excluded_product_uuids: untyped(&terms.applicability.excluded_products),
            user_conditions: terms
                .user_conditions
                .as_ref()
                .map(|conditions| Json(UserConditionsDocument::from(conditions))),
            time_restrictions: terms
                .time_restrictions
                .as_ref()
                .map(|restrictions| Json(TimeRestrictionsDocument::from(restrictions))),
        })
    }
}

fn untyped<T>(uuids: &FxHashSet<TypedUuid<T>>) -> Vec<Uuid> {
    let mut uuids: Vec<Uuid> = uuids.iter().map(|uuid| uuid.into_uuid()).collect();
    uuids.sort_unstable();
    uuids
}

fn decode_error<E>(column: &str, error: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(error),
    }
}

fn label<T>(row: &PgRow, column: &str) -> sqlx::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    row.try_get::<String, _>(column)?
        .parse()
        .map_err(|e| decode_error(column, e))
}

impl<'r> FromRow<'r, PgRow> for VoucherRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let code: String = row.try_get("code")?;
        let code = VoucherCode::parse(&code).map_err(|e| decode_error("code", e))?;

        let scope = match row.try_get::<Option<Uuid>, _>("store_uuid")? {
            Some(store) => VoucherScope::Store(StoreUuid::from_uuid(store)),
            None => VoucherScope::Platform,
        };

        let time_restrictions = row
            .try_get::<Option<Json<TimeRestrictionsDocument>>, _>("time_restrictions")?
            .map(|Json(document)| TimeRestrictions::try_from(document))
            .transpose()
            .map_err(|e| decode_error("time_restrictions", e))?;

        let user_conditions = row
            .try_get::<Option<Json<UserConditionsDocument>>, _>("user_conditions")?
            .map(|Json(document)| UserConditions::from(document));

        let terms = VoucherTerms {
            scope,
            discount: DiscountTerms {
                kind: label::<DiscountKind>(row, "discount_kind")?,
                value: try_u64_from_i64(row.try_get("discount_value")?, "discount_value")?,
                max_discount_amount: try_optional_u64_from_i64(
                    row.try_get("max_discount_amount")?,
                    "max_discount_amount",
                )?,
            },
            min_order_amount: try_optional_u64_from_i64(
                row.try_get("min_order_amount")?,
                "min_order_amount",
            )?,
            starts_at: row.try_get::<SqlxTimestamp, _>("starts_at")?.to_jiff(),
            ends_at: row.try_get::<SqlxTimestamp, _>("ends_at")?.to_jiff(),
            total_usage_limit: try_optional_u64_from_i64(
                row.try_get("total_usage_limit")?,
                "total_usage_limit",
            )?,
            per_user_limit: try_u64_from_i64(row.try_get("per_user_limit")?, "per_user_limit")?,
            collection_limit: try_optional_u64_from_i64(
                row.try_get("collection_limit")?,
                "collection_limit",
            )?,
            collection_type: label::<CollectionType>(row, "collection_type")?,
            priority: row.try_get("priority")?,
            stackable: row.try_get("stackable")?,
            new_user_only: row.try_get("new_user_only")?,
            applicability: Applicability {
                stores: typed(row.try_get("applicable_store_uuids")?),
                categories: typed(row.try_get("applicable_category_uuids")?),
                products: typed(row.try_get("applicable_product_uuids")?),
                excluded_products: typed(row.try_get("excluded_product_uuids")?),
            },
            user_conditions,
            time_restrictions,
        };

        Ok(Self {
            voucher: Voucher {
                uuid: VoucherUuid::from_uuid(row.try_get("uuid")?),
                code,
                status: label::<VoucherStatus>(row, "status")?,
                total_used_count: try_u64_from_i64(
                    row.try_get("total_used_count")?,
                    "total_used_count",
                )?,
                collected_count: try_u64_from_i64(
                    row.try_get("collected_count")?,
                    "collected_count",
                )?,
                terms,
            },
            created_by: UserUuid::from_uuid(row.try_get("created_by")?),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        })
    }
}
