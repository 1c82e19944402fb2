//! Invoice repository
//!
//! Persistence for invoice records, including the duplicate-key lookups the
//! detector runs. Uniqueness is also enforced by partial unique indexes at
//! the database (see migrations); a constraint violation on insert surfaces
//! as `AppError::Duplicate`, which callers treat as "already exists" rather
//! than as a failure. The detector is an optimization, the index is the
//! guarantee.

use async_trait::async_trait;
use chrono::NaiveDate;
use nfse_core::models::InvoiceRecord;
use nfse_core::AppError;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = "id, tenant_id, numero, codigo_verificacao, prestador_cnpj, \
     inscricao_municipal, tomador_doc, item_lista_servico, valor_servicos, base_calculo, \
     aliquota, data_emissao, competencia, data_emissao_rps, cancelada, substituida, \
     fingerprint, xml, storage_key, status, processed_at";

/// Store contract consumed by the duplicate detector and the orchestrator.
///
/// Lookups only consider *active* records (not cancelled, not substituted):
/// a re-issued invoice may legally reuse the identifiers of a tombstoned one.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Find an active record by verification code within a tenant.
    async fn find_active_by_codigo(
        &self,
        tenant_id: Uuid,
        codigo: &str,
    ) -> Result<Option<InvoiceRecord>, AppError>;

    /// Find an active record by the composite key (number, provider tax id,
    /// issue date truncated to calendar day) within a tenant.
    async fn find_active_by_composite(
        &self,
        tenant_id: Uuid,
        numero: &str,
        prestador_cnpj: &str,
        emissao_day: NaiveDate,
    ) -> Result<Option<InvoiceRecord>, AppError>;

    /// Find an active record by content fingerprint within a tenant.
    async fn find_active_by_fingerprint(
        &self,
        tenant_id: Uuid,
        fingerprint: &str,
    ) -> Result<Option<InvoiceRecord>, AppError>;

    /// Single disjunctive query for batch duplicate checking: every active
    /// record of the tenant matching any of the given verification codes,
    /// invoice numbers, or fingerprints.
    async fn find_matching(
        &self,
        tenant_id: Uuid,
        codigos: &[String],
        numeros: &[String],
        fingerprints: &[String],
    ) -> Result<Vec<InvoiceRecord>, AppError>;

    /// Insert one record.
    async fn insert(&self, record: &InvoiceRecord) -> Result<(), AppError>;

    /// Insert a batch of records in one multi-row statement.
    async fn insert_many(&self, records: &[InvoiceRecord]) -> Result<u64, AppError>;
}

/// Postgres-backed invoice repository
#[derive(Clone)]
pub struct InvoiceRepository {
    pool: PgPool,
}

impl InvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "invoices", db.operation = "select"))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<InvoiceRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, InvoiceRecord>(&format!(
            "SELECT {} FROM invoices WHERE id = $1",
            INVOICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// List a tenant's invoices, newest first.
    #[tracing::instrument(skip(self), fields(db.table = "invoices", db.operation = "select"))]
    pub async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InvoiceRecord>, AppError> {
        let records = sqlx::query_as::<Postgres, InvoiceRecord>(&format!(
            "SELECT {} FROM invoices WHERE tenant_id = $1 \
             ORDER BY data_emissao DESC LIMIT $2 OFFSET $3",
            INVOICE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

#[async_trait]
impl InvoiceStore for InvoiceRepository {
    #[tracing::instrument(skip(self), fields(db.table = "invoices", db.operation = "select"))]
    async fn find_active_by_codigo(
        &self,
        tenant_id: Uuid,
        codigo: &str,
    ) -> Result<Option<InvoiceRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, InvoiceRecord>(&format!(
            "SELECT {} FROM invoices \
             WHERE tenant_id = $1 AND codigo_verificacao = $2 AND codigo_verificacao <> '' \
               AND NOT cancelada AND NOT substituida \
             LIMIT 1",
            INVOICE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(codigo)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "invoices", db.operation = "select"))]
    async fn find_active_by_composite(
        &self,
        tenant_id: Uuid,
        numero: &str,
        prestador_cnpj: &str,
        emissao_day: NaiveDate,
    ) -> Result<Option<InvoiceRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, InvoiceRecord>(&format!(
            "SELECT {} FROM invoices \
             WHERE tenant_id = $1 AND numero = $2 AND prestador_cnpj = $3 \
               AND data_emissao::date = $4 \
               AND NOT cancelada AND NOT substituida \
             LIMIT 1",
            INVOICE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(numero)
        .bind(prestador_cnpj)
        .bind(emissao_day)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "invoices", db.operation = "select"))]
    async fn find_active_by_fingerprint(
        &self,
        tenant_id: Uuid,
        fingerprint: &str,
    ) -> Result<Option<InvoiceRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, InvoiceRecord>(&format!(
            "SELECT {} FROM invoices \
             WHERE tenant_id = $1 AND fingerprint = $2 \
               AND NOT cancelada AND NOT substituida \
             LIMIT 1",
            INVOICE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    #[tracing::instrument(
        skip(self, codigos, numeros, fingerprints),
        fields(
            db.table = "invoices",
            db.operation = "select",
            codigos = codigos.len(),
            numeros = numeros.len(),
            fingerprints = fingerprints.len()
        )
    )]
    async fn find_matching(
        &self,
        tenant_id: Uuid,
        codigos: &[String],
        numeros: &[String],
        fingerprints: &[String],
    ) -> Result<Vec<InvoiceRecord>, AppError> {
        if codigos.is_empty() && numeros.is_empty() && fingerprints.is_empty() {
            return Ok(Vec::new());
        }
        // One round trip for the whole batch. The superset fetched by
        // `numero = ANY(...)` is narrowed per candidate by the in-memory
        // probes on the detector side.
        let records = sqlx::query_as::<Postgres, InvoiceRecord>(&format!(
            "SELECT {} FROM invoices \
             WHERE tenant_id = $1 AND NOT cancelada AND NOT substituida \
               AND ((codigo_verificacao <> '' AND codigo_verificacao = ANY($2)) \
                 OR numero = ANY($3) \
                 OR fingerprint = ANY($4))",
            INVOICE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(codigos)
        .bind(numeros)
        .bind(fingerprints)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    #[tracing::instrument(
        skip(self, record),
        fields(db.table = "invoices", db.operation = "insert", numero = %record.numero)
    )]
    async fn insert(&self, record: &InvoiceRecord) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO invoices ( \
                id, tenant_id, numero, codigo_verificacao, prestador_cnpj, \
                inscricao_municipal, tomador_doc, item_lista_servico, valor_servicos, \
                base_calculo, aliquota, data_emissao, competencia, data_emissao_rps, \
                cancelada, substituida, fingerprint, xml, storage_key, status, processed_at \
             ) VALUES ( \
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                $17, $18, $19, $20, $21 \
             )",
        )
        .bind(record.id)
        .bind(record.tenant_id)
        .bind(&record.numero)
        .bind(&record.codigo_verificacao)
        .bind(&record.prestador_cnpj)
        .bind(&record.inscricao_municipal)
        .bind(&record.tomador_doc)
        .bind(&record.item_lista_servico)
        .bind(record.valor_servicos)
        .bind(record.base_calculo)
        .bind(record.aliquota)
        .bind(record.data_emissao)
        .bind(&record.competencia)
        .bind(record.data_emissao_rps)
        .bind(record.cancelada)
        .bind(record.substituida)
        .bind(&record.fingerprint)
        .bind(&record.xml)
        .bind(&record.storage_key)
        .bind(record.status)
        .bind(record.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(
        skip(self, records),
        fields(db.table = "invoices", db.operation = "insert", batch_size = records.len())
    )]
    async fn insert_many(&self, records: &[InvoiceRecord]) -> Result<u64, AppError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO invoices ( \
                id, tenant_id, numero, codigo_verificacao, prestador_cnpj, \
                inscricao_municipal, tomador_doc, item_lista_servico, valor_servicos, \
                base_calculo, aliquota, data_emissao, competencia, data_emissao_rps, \
                cancelada, substituida, fingerprint, xml, storage_key, status, processed_at \
             ) ",
        );
        builder.push_values(records.iter(), |mut b, r| {
            b.push_bind(r.id)
                .push_bind(r.tenant_id)
                .push_bind(&r.numero)
                .push_bind(&r.codigo_verificacao)
                .push_bind(&r.prestador_cnpj)
                .push_bind(&r.inscricao_municipal)
                .push_bind(&r.tomador_doc)
                .push_bind(&r.item_lista_servico)
                .push_bind(r.valor_servicos)
                .push_bind(r.base_calculo)
                .push_bind(r.aliquota)
                .push_bind(r.data_emissao)
                .push_bind(&r.competencia)
                .push_bind(r.data_emissao_rps)
                .push_bind(r.cancelada)
                .push_bind(r.substituida)
                .push_bind(&r.fingerprint)
                .push_bind(&r.xml)
                .push_bind(&r.storage_key)
                .push_bind(r.status)
                .push_bind(r.processed_at);
        });

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
