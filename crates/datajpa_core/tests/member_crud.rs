use datajpa_core::db::open_db_in_memory;
use datajpa_core::{
    Member, MemberRepository, RepoError, SqliteMemberRepository, SqliteTeamRepository, Team,
    TeamRepository,
};

#[test]
fn save_then_find_by_id_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut member = Member::new("memberA");
    let id = repo.save(&mut member).unwrap();

    assert_eq!(member.id, Some(id));
    let found = repo.find_by_id(id).unwrap().unwrap();
    assert_eq!(found, member);
    assert_eq!(found.username, "memberA");
    assert_eq!(found.age, 0);
}

#[test]
fn roundtrip_preserves_team_reference() {
    let conn = open_db_in_memory().unwrap();
    let teams = SqliteTeamRepository::try_new(&conn).unwrap();
    let members = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut team = Team::new("teamA");
    teams.save(&mut team).unwrap();
    let mut member = Member::with_team("member1", 10, &mut team);
    let id = members.save(&mut member).unwrap();

    let found = members.find_by_id(id).unwrap().unwrap();
    assert_eq!(found, member);
    assert_eq!(found.team_id(), team.id);
    assert!(!found.team.as_ref().unwrap().is_loaded());
}

#[test]
fn basic_crud_counts_follow_saves_and_deletes() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut member1 = Member::new("member1");
    let mut member2 = Member::new("member2");
    repo.save(&mut member1).unwrap();
    repo.save(&mut member2).unwrap();

    assert_eq!(repo.find_by_id(member1.id.unwrap()).unwrap().unwrap(), member1);
    assert_eq!(repo.find_by_id(member2.id.unwrap()).unwrap().unwrap(), member2);
    assert_eq!(repo.find_all().unwrap().len(), 2);
    assert_eq!(repo.count().unwrap(), 2);

    repo.delete(&member1).unwrap();
    assert_eq!(repo.count().unwrap(), 1);
    repo.delete(&member2).unwrap();
    assert_eq!(repo.count().unwrap(), 0);
}

#[test]
fn count_equals_saved_minus_deleted() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut saved = Vec::new();
    for index in 0..7 {
        let mut member = Member::with_age(format!("member{index}"), index);
        repo.save(&mut member).unwrap();
        saved.push(member);
    }
    for member in saved.iter().take(3) {
        repo.delete(member).unwrap();
    }

    assert_eq!(repo.count().unwrap(), 4);
}

#[test]
fn find_by_id_returns_none_for_missing_row() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    assert!(repo.find_by_id(12345).unwrap().is_none());
}

#[test]
fn delete_of_absent_or_transient_member_is_noop() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut member = Member::new("gone");
    repo.save(&mut member).unwrap();
    repo.delete(&member).unwrap();
    repo.delete(&member).unwrap();
    repo.delete(&Member::new("never saved")).unwrap();

    assert_eq!(repo.count().unwrap(), 0);
}

#[test]
fn save_on_persisted_member_updates_instead_of_duplicating() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut member = Member::with_age("member1", 10);
    let id = repo.save(&mut member).unwrap();
    member.age = 11;
    member.username = "renamed".to_string();
    let second_id = repo.save(&mut member).unwrap();

    assert_eq!(id, second_id);
    assert_eq!(repo.count().unwrap(), 1);
    let found = repo.find_by_id(id).unwrap().unwrap();
    assert_eq!(found.age, 11);
    assert_eq!(found.username, "renamed");
}

#[test]
fn ids_are_not_reused_after_delete() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut first = Member::new("first");
    let first_id = repo.save(&mut first).unwrap();
    repo.delete(&first).unwrap();

    let mut second = Member::new("second");
    let second_id = repo.save(&mut second).unwrap();
    assert!(second_id > first_id);
}

#[test]
fn saving_member_with_unsaved_team_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut team = Team::new("unsaved");
    let mut member = Member::with_team("member1", 10, &mut team);

    let err = repo.save(&mut member).unwrap_err();
    assert!(matches!(err, RepoError::TransientReference { .. }));
    assert_eq!(member.id, None);
    assert_eq!(repo.count().unwrap(), 0);
}

#[test]
fn dangling_team_reference_is_a_constraint_violation() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut team = Team::new("ghost");
    team.id = Some(999);
    let mut member = Member::with_team("member1", 10, &mut team);

    let err = repo.save(&mut member).unwrap_err();
    assert!(matches!(err, RepoError::ConstraintViolation(_)));

    member.team = None;
    repo.save(&mut member).unwrap();
    assert_eq!(repo.count().unwrap(), 1);
}

#[test]
fn team_crud_and_member_view() {
    let conn = open_db_in_memory().unwrap();
    let teams = SqliteTeamRepository::try_new(&conn).unwrap();
    let members = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut team_a = Team::new("teamA");
    let mut team_b = Team::new("teamB");
    teams.save(&mut team_a).unwrap();
    teams.save(&mut team_b).unwrap();
    assert_eq!(teams.count().unwrap(), 2);

    for (name, age) in [("member1", 10), ("member3", 16)] {
        let mut member = Member::with_team(name, age, &mut team_a);
        members.save(&mut member).unwrap();
    }
    let mut other = Member::with_team("member2", 13, &mut team_b);
    members.save(&mut other).unwrap();

    let loaded = teams.find_with_members(team_a.id.unwrap()).unwrap().unwrap();
    assert_eq!(loaded.name, "teamA");
    let usernames: Vec<_> = loaded.members.iter().map(|m| m.username.as_str()).collect();
    assert_eq!(usernames, vec!["member1", "member3"]);
    assert!(loaded.members.iter().all(|m| m.id.is_some()));

    team_b.name = "teamB2".to_string();
    teams.save(&mut team_b).unwrap();
    assert_eq!(teams.find_by_id(team_b.id.unwrap()).unwrap().unwrap().name, "teamB2");
    assert_eq!(teams.find_all().unwrap().len(), 2);
}

#[test]
fn deleting_referenced_team_is_a_constraint_violation() {
    let conn = open_db_in_memory().unwrap();
    let teams = SqliteTeamRepository::try_new(&conn).unwrap();
    let members = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut team = Team::new("teamA");
    teams.save(&mut team).unwrap();
    let mut member = Member::with_team("member1", 10, &mut team);
    members.save(&mut member).unwrap();

    let err = teams.delete(&team).unwrap_err();
    assert!(matches!(err, RepoError::ConstraintViolation(_)));

    members.delete(&member).unwrap();
    teams.delete(&team).unwrap();
    assert_eq!(teams.count().unwrap(), 0);
}
