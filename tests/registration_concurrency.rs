//! Concurrent registration of one identity yields exactly one customer.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use id_onboard::identity::{Country, IdentityRecord};
use id_onboard::pipeline::{
    Registrar, RegistrationOutcome, RegistrationStep, VerificationStep, VerifiedIdentity, Verifier,
};
use id_onboard::registry::RegistrySimulator;
use id_onboard::store::{LibSqlRecordStore, MemoryRecordStore, RecordStore};

const SESSIONS: usize = 24;

async fn verified(
    country: Country,
    national_id: &str,
    first: &str,
    last: &str,
    dob: &str,
) -> VerifiedIdentity {
    let identity = IdentityRecord {
        country,
        first_name: Some(first.into()),
        last_name: Some(last.into()),
        date_of_birth: Some(dob.into()),
        national_id: Some(national_id.into()),
    };
    let verifier = Verifier::new(
        Arc::new(RegistrySimulator::with_seed_data()),
        Duration::from_secs(1),
    );
    let result = verifier.verify(&identity).await;
    VerifiedIdentity::from_result(&identity, &result).expect("seeded identity verifies")
}

/// Race `SESSIONS` registrations and return (created, already_exists).
async fn race(store: Arc<dyn RecordStore>, identity: VerifiedIdentity) -> (usize, usize) {
    let registrar = Arc::new(Registrar::new(store, "example.com", Duration::from_secs(5)));
    let identity = Arc::new(identity);

    let handles = (0..SESSIONS).map(|_| {
        let registrar = Arc::clone(&registrar);
        let identity = Arc::clone(&identity);
        tokio::spawn(async move { registrar.register(&identity).await })
    });

    let mut created = 0;
    let mut existing = 0;
    for joined in join_all(handles).await {
        match joined.unwrap().unwrap() {
            RegistrationOutcome::Created(_) => created += 1,
            RegistrationOutcome::AlreadyExists { key, .. } => {
                assert_eq!(key, identity.key());
                existing += 1;
            }
        }
    }
    (created, existing)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_store_admits_one_winner() {
    let store = Arc::new(MemoryRecordStore::new());
    let identity = verified(Country::Denmark, "160778-1234", "Maria", "Larsen", "1978-07-16").await;

    let (created, existing) = race(store.clone(), identity).await;

    assert_eq!(created, 1);
    assert_eq!(existing, SESSIONS - 1);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn libsql_store_admits_one_winner() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(
        LibSqlRecordStore::new_local(&tmp.path().join("onboard.db"))
            .await
            .unwrap(),
    );
    let identity = verified(Country::Norway, "47020254321", "Kari", "Nordmann", "2002-02-02").await;

    let (created, existing) = race(store.clone(), identity).await;

    assert_eq!(created, 1);
    assert_eq!(existing, SESSIONS - 1);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_identities_do_not_contend() {
    let store = Arc::new(MemoryRecordStore::new());
    let registrar = Arc::new(Registrar::new(
        store.clone(),
        "example.com",
        Duration::from_secs(5),
    ));
    let people = [
        verified(Country::Sweden, "19800101-1230", "Anna", "Svensson", "1980-01-01").await,
        verified(Country::Sweden, "19950715-8899", "Erik", "Johansson", "1995-07-15").await,
        verified(Country::Finland, "010180-999Y", "Liisa", "Virtanen", "1980-01-01").await,
    ];

    let outcomes = join_all(people.iter().map(|p| registrar.register(p))).await;

    assert!(
        outcomes
            .into_iter()
            .all(|o| matches!(o, Ok(RegistrationOutcome::Created(_))))
    );
    assert_eq!(store.count().await.unwrap(), 3);
}
