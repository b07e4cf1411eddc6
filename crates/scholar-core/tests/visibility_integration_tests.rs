//! Integration tests for row visibility across tenants and relationships.
//!
//! Each test runs against its own in-memory SQLite database through the
//! public repository API only.

use scholar_core::db::{
    create_parent_repository, create_pool_with_options, create_school_repository,
    create_student_repository, run_migrations, DbPool, Pagination, ParentRepository, PoolOptions,
    SchoolRepository, StudentFilter, StudentRepository,
};
use scholar_core::models::{NewParent, NewSchool, NewStudent, Student, VerificationStatus};
use scholar_core::{resolve_filter, Identity, Predicate, ResourceKind, Role, User};
use uuid::Uuid;

async fn test_pool() -> DbPool {
    let url = format!(
        "sqlite:file:visibility_{}?mode=memory&cache=shared",
        Uuid::new_v4()
    );
    let pool = create_pool_with_options(&url, PoolOptions::single_connection())
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

async fn school(pool: &DbPool, code: &str) -> Uuid {
    create_school_repository(pool)
        .create(&NewSchool {
            name: format!("{} High", code),
            code: code.to_string(),
            email: None,
            phone: None,
            address: None,
            verification_status: VerificationStatus::Approved,
        })
        .await
        .unwrap()
        .id
}

async fn student(pool: &DbPool, school_id: Uuid, admission_no: &str) -> Student {
    create_student_repository(pool)
        .create(&NewStudent {
            school_id,
            class_id: None,
            first_name: "Ada".to_string(),
            last_name: admission_no.to_string(),
            admission_no: admission_no.to_string(),
            date_of_birth: None,
            address: None,
            enrolled_on: None,
        })
        .await
        .unwrap()
}

async fn parent_account(pool: &DbPool, school_id: Uuid, email: &str) -> User {
    let (_, user) = create_parent_repository(pool)
        .create_with_account(
            &NewParent {
                school_id,
                first_name: "Pat".to_string(),
                last_name: "Guardian".to_string(),
                email: email.to_string(),
                phone: None,
                address: None,
            },
            "not-a-real-hash",
        )
        .await
        .unwrap();
    user
}

fn admin_of(school_id: Uuid) -> Identity {
    let user = User::new(
        "admin@school.test",
        "hash",
        "Ada",
        "Admin",
        Role::SchoolAdmin,
        Some(school_id),
    );
    Identity::from_user(&user)
}

#[tokio::test]
async fn test_admin_sees_only_own_school() {
    let pool = test_pool().await;
    let north = school(&pool, "NORTH").await;
    let south = school(&pool, "SOUTH").await;
    let mine = student(&pool, north, "N-1").await;
    let theirs = student(&pool, south, "S-1").await;

    let students = create_student_repository(&pool);
    let predicate = resolve_filter(&admin_of(north), ResourceKind::Student, None);
    assert_eq!(predicate, Predicate::Tenant { school_id: north });

    assert!(students.find(&predicate, mine.id).await.unwrap().is_some());
    assert!(students.find(&predicate, theirs.id).await.unwrap().is_none());

    let page = students
        .list(&predicate, &StudentFilter::default(), &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, mine.id);
}

#[tokio::test]
async fn test_narrowing_is_ignored_for_tenant_roles() {
    let pool = test_pool().await;
    let north = school(&pool, "NORTH").await;
    let south = school(&pool, "SOUTH").await;
    student(&pool, south, "S-1").await;

    let predicate = resolve_filter(&admin_of(north), ResourceKind::Student, Some(south));
    let page = create_student_repository(&pool)
        .list(&predicate, &StudentFilter::default(), &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_parent_sees_linked_children_only() {
    let pool = test_pool().await;
    let north = school(&pool, "NORTH").await;
    let child = student(&pool, north, "N-1").await;
    let classmate = student(&pool, north, "N-2").await;
    let user = parent_account(&pool, north, "pat@north.test").await;
    let parent_id = user.parent_id.unwrap();

    create_parent_repository(&pool)
        .add_guardianship(parent_id, child.id, "mother")
        .await
        .unwrap();

    let predicate = resolve_filter(&Identity::from_user(&user), ResourceKind::Student, None);
    assert!(matches!(predicate, Predicate::Related { .. }));

    let students = create_student_repository(&pool);
    assert!(students.find(&predicate, child.id).await.unwrap().is_some());
    assert!(students.find(&predicate, classmate.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_links_fail_closed() {
    let pool = test_pool().await;
    let north = school(&pool, "NORTH").await;
    student(&pool, north, "N-1").await;

    // A parent account with no parent record behind it.
    let orphan = User::new(
        "orphan@north.test",
        "hash",
        "Olly",
        "Orphan",
        Role::Parent,
        Some(north),
    );
    let predicate = resolve_filter(&Identity::from_user(&orphan), ResourceKind::Student, None);
    assert!(predicate.is_fail_closed());

    let page = create_student_repository(&pool)
        .list(&predicate, &StudentFilter::default(), &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
    assert!(page.items.is_empty());
}
