use sqlx::PgPool;
use sqlx::Row;

use crate::error::SchedulerError;
use crate::postgres::config;
use crate::postgres::row::RunRow;

/// spec.md §4.4.2 "Claim protocol": one transaction, `FOR UPDATE OF runs
/// SKIP LOCKED`, STICKY pass before FALLBACK pass so a worker prefers runs
/// it already owns the session lease for.
pub async fn claim_next_run(pool: &PgPool, worker_id: &str) -> Result<Option<RunRow>, SchedulerError> {
    let mut tx = pool.begin().await?;

    sqlx::query("delete from worker_session_leases where lease_until < now()")
        .execute(&mut *tx)
        .await?;

    let sticky = sqlx::query_as::<_, RunRow>(
        r#"
        select runs.*
        from runs
        join worker_session_leases on worker_session_leases.session_id = runs.session_id
        where worker_session_leases.worker_id = $1
          and worker_session_leases.lease_until >= now()
          and (runs.status = 'queued' or (runs.status = 'running' and runs.lease_until < now()))
        order by runs.created_at asc
        limit 1
        for update of runs skip locked
        "#,
    )
    .bind(worker_id)
    .fetch_optional(&mut *tx)
    .await?;

    let claimed = match sticky {
        Some(row) => Some(row),
        None => {
            sqlx::query_as::<_, RunRow>(
                r#"
                select runs.*
                from runs
                left join worker_session_leases on worker_session_leases.session_id = runs.session_id
                where (worker_session_leases.session_id is null or worker_session_leases.worker_id = $1)
                  and (runs.status = 'queued' or (runs.status = 'running' and runs.lease_until < now()))
                order by runs.created_at asc
                limit 1
                for update of runs skip locked
                "#,
            )
            .bind(worker_id)
            .fetch_optional(&mut *tx)
            .await?
        }
    };

    let Some(row) = claimed else {
        tx.commit().await?;
        return Ok(None);
    };

    let lease_seconds = config::lease_seconds() as f64;
    let sticky_seconds = config::session_sticky_seconds() as f64;

    let claimed_row = sqlx::query_as::<_, RunRow>(
        r#"
        update runs
        set status = 'running',
            owner_id = $1,
            lease_until = now() + make_interval(secs => $2),
            started_at = coalesce(started_at, now())
        where run_id = $3
        returning *
        "#,
    )
    .bind(worker_id)
    .bind(lease_seconds)
    .bind(&row.run_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        insert into worker_session_leases (session_id, worker_id, lease_until, updated_at)
        values ($1, $2, now() + make_interval(secs => $3), now())
        on conflict (session_id)
        do update set worker_id = excluded.worker_id, lease_until = excluded.lease_until, updated_at = now()
        "#,
    )
    .bind(&claimed_row.session_id)
    .bind(worker_id)
    .bind(sticky_seconds)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(claimed_row))
}

/// Renews the run lease and the session-sticky lease in one shot. Returns
/// `false` if either update affected zero rows — the caller must then abort
/// the run with `"worker lease lost"`.
pub async fn renew_lease(pool: &PgPool, run_id: &str, session_id: &str, worker_id: &str) -> Result<bool, SchedulerError> {
    let lease_seconds = config::lease_seconds() as f64;
    let sticky_seconds = config::session_sticky_seconds() as f64;

    let run_result = sqlx::query(
        r#"
        update runs
        set lease_until = now() + make_interval(secs => $1)
        where run_id = $2 and owner_id = $3 and status = 'running'
        "#,
    )
    .bind(lease_seconds)
    .bind(run_id)
    .bind(worker_id)
    .execute(pool)
    .await?;

    let lease_result = sqlx::query(
        r#"
        update worker_session_leases
        set lease_until = now() + make_interval(secs => $1), updated_at = now()
        where session_id = $2 and worker_id = $3
        "#,
    )
    .bind(sticky_seconds)
    .bind(session_id)
    .bind(worker_id)
    .execute(pool)
    .await?;

    Ok(run_result.rows_affected() > 0 && lease_result.rows_affected() > 0)
}

pub async fn cancel_requested(pool: &PgPool, run_id: &str) -> Result<bool, SchedulerError> {
    let row = sqlx::query("select cancel_requested_at is not null as requested from runs where run_id = $1")
        .bind(run_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get::<bool, _>("requested")).unwrap_or(false))
}
