//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `datajpa_core` linkage end to end: config, logging, storage.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `datajpa_cli [config.json]`. Without a config file an in-memory
//! store is used.

use datajpa_core::{
    init_logging_from_config, Member, MemberRepository, Order, PageRequest, SortField,
    StoreConfig, Team, UnitOfWork,
};
use log::error;
use std::error::Error;
use std::process::ExitCode;

const DEMO_MEMBERS: [(&str, i32, usize); 5] = [
    ("member1", 10, 0),
    ("member2", 10, 1),
    ("member3", 10, 0),
    ("member4", 20, 1),
    ("member5", 40, 0),
];

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("datajpa_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => StoreConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => StoreConfig::default(),
    };
    init_logging_from_config(&config)?;

    println!("datajpa_core version={}", datajpa_core::core_version());

    let conn = datajpa_core::db::open_db_with_config(&config)?;
    let mut uow = UnitOfWork::begin(&conn)?;

    let mut teams = [Team::new("teamA"), Team::new("teamB")];
    for team in &mut teams {
        uow.save_team(team)?;
    }
    for (username, age, team_index) in DEMO_MEMBERS {
        let mut member = Member::with_team(username, age, &mut teams[team_index]);
        uow.save_member(&mut member)?;
    }

    let request = PageRequest::of(0, 3).with_sort(Order::desc(SortField::Username));
    let page = uow.members().find_page_by_age(10, &request)?;
    println!(
        "page number={} size={} total_elements={} total_pages={} has_next={}",
        page.number(),
        page.size(),
        page.total_elements(),
        page.total_pages(),
        page.has_next()
    );
    for member in page.content() {
        let team_name = member
            .team
            .as_ref()
            .and_then(|relation| relation.get())
            .map_or("-", |team| team.name.as_str());
        println!("  member={} age={} team={}", member.username, member.age, team_name);
    }

    let bumped = uow.bulk_age_plus(20)?;
    println!("bulk_age_plus threshold=20 rows={bumped}");

    uow.commit()?;
    Ok(())
}
