use std::collections::BTreeMap;
use std::env;

use anyhow::{anyhow, bail, Context, Result};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use resource_directory::{
    auth::{password, Role},
    config::AppConfig,
    db,
    history::versions::numbering_gaps,
    models::NewUser,
    schema::{resource_versions, resources, users},
};

const USAGE: &str = "Usage:\n  maintenance create-user <username> <password> <role>\n  maintenance check-history";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt().with_target(false).compact().init();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["create-user", username, secret, role] => create_user(username, secret, role),
        ["check-history"] => check_history(),
        [cmd, ..] => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        [] => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}

fn connect() -> Result<PgConnection> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    let mut conn = PgConnection::establish(&config.database_url)
        .context("failed to connect to database")?;
    db::run_migrations(&mut conn)?;
    Ok(conn)
}

fn create_user(username: &str, plain_password: &str, role: &str) -> Result<()> {
    let role: Role = role.parse().map_err(|err: String| anyhow!(err))?;
    let username = username.trim();
    if username.is_empty() {
        bail!("username must not be empty");
    }

    let mut conn = connect()?;
    let password_hash = password::hash_password(plain_password)?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash,
        role: role.as_str().to_string(),
    };

    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
        .with_context(|| format!("failed to create user '{username}'"))?;

    println!("Created {role} '{username}' ({})", new_user.id);
    Ok(())
}

/// Reports resources without a version row or whose version numbers are not 1..N.
fn check_history() -> Result<()> {
    let mut conn = connect()?;

    let resource_ids: Vec<i64> = resources::table
        .select(resources::id)
        .order(resources::id.asc())
        .load(&mut conn)
        .context("failed to load resources")?;

    let rows: Vec<(i64, i32)> = resource_versions::table
        .select((resource_versions::resource_id, resource_versions::version_number))
        .load(&mut conn)
        .context("failed to load resource versions")?;

    let mut numbers: BTreeMap<i64, Vec<i32>> = BTreeMap::new();
    for (resource_id, version_number) in rows {
        numbers.entry(resource_id).or_default().push(version_number);
    }

    let mut problems = 0;
    for resource_id in &resource_ids {
        match numbers.get(resource_id) {
            None => {
                problems += 1;
                println!("resource {resource_id}: no versions recorded");
            }
            Some(found) => {
                let gaps = numbering_gaps(found);
                if !gaps.is_empty() {
                    problems += 1;
                    println!("resource {resource_id}: out-of-sequence versions {gaps:?}");
                }
            }
        }
    }

    if problems == 0 {
        println!("Checked {} resources, history is consistent.", resource_ids.len());
        Ok(())
    } else {
        bail!("{problems} of {} resources have inconsistent history", resource_ids.len())
    }
}
