use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::import::{self, CsvCutoff};
use crate::models::{CounsellingType, CutoffRow, ImportRecord, ImportStats, PredictQuery};

const BATCH_SIZE: usize = 500;

/// State recorded for colleges created by a CSV import.
const IMPORT_STATE: &str = "Unknown";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let exams = vec![
        ("JEE Main", "JEE_MAIN"),
        ("JEE Advanced", "JEE_ADV"),
        ("MHT CET", "MHTCET"),
    ];

    for (name, code) in exams {
        sqlx::query(
            r#"
            INSERT INTO cutoff_predictor.exams (name, code)
            VALUES ($1, $2)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(code)
        .execute(pool)
        .await?;
    }

    let tracks = vec![
        ("JoSAA", "JEE_ADV"),
        ("CSAB", "JEE_MAIN"),
        ("AKTU", "JEE_MAIN"),
        ("MHTCET", "MHTCET"),
    ];

    for (name, exam_code) in tracks {
        sqlx::query(
            r#"
            INSERT INTO cutoff_predictor.counselling_types (name, exam_id)
            SELECT $1, id FROM cutoff_predictor.exams WHERE code = $2
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(exam_code)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn fetch_counselling_types(pool: &PgPool) -> anyhow::Result<Vec<CounsellingType>> {
    let rows = sqlx::query(
        r#"
        SELECT cty.id, cty.name, e.name AS exam_name
        FROM cutoff_predictor.counselling_types cty
        LEFT JOIN cutoff_predictor.exams e ON e.id = cty.exam_id
        ORDER BY cty.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CounsellingType {
            id: row.get("id"),
            name: row.get("name"),
            exam_name: row.get("exam_name"),
        })
        .collect())
}

/// Cutoff rows narrowed to the query's bucket, ordered by college,
/// branch and year.
pub async fn fetch_history(pool: &PgPool, query: &PredictQuery) -> anyhow::Result<Vec<CutoffRow>> {
    let mut sql = String::from(
        "SELECT c.name AS college_name, c.state, c.type AS college_type, \
         b.name AS branch_name, b.code AS branch_code, cty.name AS counselling_name, \
         ct.category, ct.quota, ct.gender, ct.year, ct.round, ct.closing_rank \
         FROM cutoff_predictor.cutoffs ct \
         JOIN cutoff_predictor.colleges c ON ct.college_id = c.id \
         JOIN cutoff_predictor.branches b ON ct.branch_id = b.id \
         JOIN cutoff_predictor.counselling_types cty ON ct.counselling_type_id = cty.id \
         WHERE ct.category = $1 AND ct.quota = $2 AND ct.gender = $3",
    );

    let counselling = query.counselling_filter();
    let college_types: Option<Vec<String>> = query
        .exam_type
        .map(|exam| exam.college_types().iter().map(|t| t.to_string()).collect());

    let mut next_param = 4;
    if counselling.is_some() {
        sql.push_str(&format!(" AND LOWER(cty.name) = LOWER(${next_param})"));
        next_param += 1;
    }
    if college_types.is_some() {
        sql.push_str(&format!(" AND c.type = ANY(${next_param})"));
    }
    sql.push_str(" ORDER BY ct.college_id, ct.branch_id, ct.year ASC, ct.round ASC");

    let mut rows = sqlx::query(&sql)
        .bind(&query.category)
        .bind(&query.quota)
        .bind(&query.gender);
    if let Some(name) = counselling {
        rows = rows.bind(name);
    }
    if let Some(types) = college_types {
        rows = rows.bind(types);
    }

    let records = rows.fetch_all(pool).await?;
    debug!(rows = records.len(), "fetched cutoff history");

    Ok(records
        .into_iter()
        .map(|row| CutoffRow {
            college_name: row.get("college_name"),
            state: row.get("state"),
            college_type: row.get("college_type"),
            branch_name: row.get("branch_name"),
            branch_code: row.get("branch_code"),
            counselling_name: row.get("counselling_name"),
            category: row.get("category"),
            quota: row.get("quota"),
            gender: row.get("gender"),
            year: row.get("year"),
            round: row.get("round"),
            closing_rank: row.get("closing_rank"),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CutoffKey {
    college_id: i32,
    branch_id: i32,
    year: i32,
    round: i32,
    category: String,
    quota: String,
    gender: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingRanks {
    opening_rank: i64,
    closing_rank: i64,
}

/// Imports a cutoff CSV for one counselling track inside a single
/// transaction. Returns how many rows were accepted and rejected.
pub async fn import_csv(
    pool: &PgPool,
    csv_path: &Path,
    counselling: &str,
) -> anyhow::Result<ImportStats> {
    let counselling_id: Option<i32> = sqlx::query(
        "SELECT id FROM cutoff_predictor.counselling_types WHERE LOWER(name) = LOWER($1)",
    )
    .bind(counselling)
    .fetch_optional(pool)
    .await?
    .map(|row| row.get("id"));
    let Some(counselling_id) = counselling_id else {
        bail!("unknown counselling type {counselling:?}; run `seed` or check `counselling-types`");
    };

    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let parsed = import::parse_csv(file)?;

    let filename = csv_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| csv_path.display().to_string());
    let import_id = Uuid::new_v4();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO cutoff_predictor.imports (id, filename, counselling_type_id)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(import_id)
    .bind(&filename)
    .bind(counselling_id)
    .execute(&mut *tx)
    .await?;

    let mut colleges: HashMap<String, i32> = HashMap::new();
    let mut branches: HashMap<String, i32> = HashMap::new();
    let mut batch: Vec<(CutoffKey, PendingRanks)> = Vec::with_capacity(BATCH_SIZE);
    let mut success = 0usize;

    for row in &parsed.rows {
        let college_id = match colleges.get(&row.college_name) {
            Some(id) => *id,
            None => {
                let id = upsert_college(&mut tx, row).await?;
                colleges.insert(row.college_name.clone(), id);
                id
            }
        };
        let branch_id = match branches.get(&row.branch_code) {
            Some(id) => *id,
            None => {
                let id = upsert_branch(&mut tx, row).await?;
                branches.insert(row.branch_code.clone(), id);
                id
            }
        };

        batch.push((
            CutoffKey {
                college_id,
                branch_id,
                year: row.year,
                round: row.round,
                category: row.category.clone(),
                quota: row.quota.clone(),
                gender: row.gender.clone(),
            },
            PendingRanks {
                opening_rank: row.opening_rank,
                closing_rank: row.closing_rank,
            },
        ));
        success += 1;

        if batch.len() >= BATCH_SIZE {
            flush_batch(&mut tx, &mut batch, counselling_id, import_id).await?;
        }
    }
    flush_batch(&mut tx, &mut batch, counselling_id, import_id).await?;

    sqlx::query("UPDATE cutoff_predictor.imports SET record_count = $1 WHERE id = $2")
        .bind(i32::try_from(success).unwrap_or(i32::MAX))
        .bind(import_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let stats = ImportStats {
        success,
        failed: parsed.failed,
    };
    info!(
        import = %import_id,
        file = %filename,
        success = stats.success,
        failed = stats.failed,
        "import finished"
    );
    Ok(stats)
}

async fn upsert_college(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    row: &CsvCutoff,
) -> anyhow::Result<i32> {
    let id = sqlx::query(
        r#"
        INSERT INTO cutoff_predictor.colleges (name, state, type)
        VALUES ($1, $2, $3)
        ON CONFLICT (name, state) DO UPDATE SET type = EXCLUDED.type
        RETURNING id
        "#,
    )
    .bind(&row.college_name)
    .bind(IMPORT_STATE)
    .bind(&row.college_type)
    .fetch_one(&mut **tx)
    .await?
    .get("id");
    Ok(id)
}

async fn upsert_branch(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    row: &CsvCutoff,
) -> anyhow::Result<i32> {
    let id = sqlx::query(
        r#"
        INSERT INTO cutoff_predictor.branches (name, code)
        VALUES ($1, $2)
        ON CONFLICT (code) DO UPDATE SET name = cutoff_predictor.branches.name
        RETURNING id
        "#,
    )
    .bind(&row.branch_name)
    .bind(&row.branch_code)
    .fetch_one(&mut **tx)
    .await?
    .get("id");
    Ok(id)
}

async fn flush_batch(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    batch: &mut Vec<(CutoffKey, PendingRanks)>,
    counselling_id: i32,
    import_id: Uuid,
) -> anyhow::Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO cutoff_predictor.cutoffs \
         (college_id, branch_id, counselling_type_id, year, round, category, quota, gender, \
         opening_rank, closing_rank, import_id) ",
    );
    let unique = dedupe_last_wins(std::mem::take(batch));
    builder.push_values(unique, |mut values, (key, ranks)| {
        values
            .push_bind(key.college_id)
            .push_bind(key.branch_id)
            .push_bind(counselling_id)
            .push_bind(key.year)
            .push_bind(key.round)
            .push_bind(key.category)
            .push_bind(key.quota)
            .push_bind(key.gender)
            .push_bind(ranks.opening_rank)
            .push_bind(ranks.closing_rank)
            .push_bind(import_id);
    });
    builder.push(
        " ON CONFLICT (college_id, branch_id, counselling_type_id, year, round, category, quota, gender) \
         DO UPDATE SET opening_rank = EXCLUDED.opening_rank, \
         closing_rank = EXCLUDED.closing_rank, \
         import_id = EXCLUDED.import_id",
    );

    builder.build().execute(&mut **tx).await?;
    Ok(())
}

/// Postgres rejects an upsert that touches the same row twice, so one key
/// may appear once per statement. The last occurrence's ranks win.
fn dedupe_last_wins(pending: Vec<(CutoffKey, PendingRanks)>) -> Vec<(CutoffKey, PendingRanks)> {
    let mut slots: HashMap<CutoffKey, usize> = HashMap::new();
    let mut unique: Vec<(CutoffKey, PendingRanks)> = Vec::with_capacity(pending.len());

    for (key, ranks) in pending {
        match slots.get(&key) {
            Some(&slot) => unique[slot].1 = ranks,
            None => {
                slots.insert(key.clone(), unique.len());
                unique.push((key, ranks));
            }
        }
    }

    unique
}

pub async fn fetch_imports(pool: &PgPool) -> anyhow::Result<Vec<ImportRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT i.id, i.filename, i.record_count, i.created_at, cty.name AS counselling_name
        FROM cutoff_predictor.imports i
        LEFT JOIN cutoff_predictor.counselling_types cty ON cty.id = i.counselling_type_id
        ORDER BY i.created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ImportRecord {
            id: row.get("id"),
            filename: row.get("filename"),
            counselling_name: row.get("counselling_name"),
            record_count: row.get("record_count"),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Deletes one import batch; its cutoffs go with it through the cascade.
pub async fn delete_import(pool: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM cutoff_predictor.imports WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, Clone)]
pub struct DataSummary {
    pub total_cutoffs: i64,
    pub buckets: Vec<(String, String, String)>,
}

pub async fn data_summary(pool: &PgPool) -> anyhow::Result<DataSummary> {
    let total_cutoffs: i64 = sqlx::query("SELECT COUNT(*) AS total FROM cutoff_predictor.cutoffs")
        .fetch_one(pool)
        .await?
        .get("total");

    let buckets = sqlx::query(
        r#"
        SELECT DISTINCT category, quota, gender
        FROM cutoff_predictor.cutoffs
        ORDER BY category, quota, gender
        LIMIT 20
        "#,
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| (row.get("category"), row.get("quota"), row.get("gender")))
    .collect();

    Ok(DataSummary {
        total_cutoffs,
        buckets,
    })
}
