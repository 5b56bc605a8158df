mod common;

use anyhow::Result;
use autorent::application::{AppError, ErrorKind};
use autorent::domain::NewUser;
use common::{Fleet, PASSWORD, new_user, test_ledger};

#[tokio::test]
async fn test_register_and_login() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;

    let user = ledger.register_user(new_user("Ada")).await?;
    assert!(user.id > 0);
    assert_eq!(user.email, "ada@example.com");
    assert!(user.password_hash.starts_with("$argon2id$"));
    assert!(!user.owns_car());
    assert!(!user.is_renting());

    let logged_in = ledger.login("ada@example.com", PASSWORD).await?;
    assert_eq!(logged_in.id, user.id);
    Ok(())
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    ledger.register_user(new_user("Ada")).await?;

    let err = ledger.login("ada@example.com", "wrong password").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));

    // Unknown email looks the same as a wrong password
    let err = ledger.login("nobody@example.com", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));
    Ok(())
}

#[tokio::test]
async fn test_email_must_be_unique() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    ledger.register_user(new_user("Ada")).await?;

    let mut again = new_user("Ada");
    again.name = "Another".into();
    let err = ledger.register_user(again).await.unwrap_err();
    assert!(matches!(err, AppError::EmailTaken(ref email) if email == "ada@example.com"));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert_eq!(ledger.list_users().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_register_validation() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;

    let err = ledger
        .register_user(NewUser {
            name: String::new(),
            surname: "Lovelace".into(),
            email: "ada@example.com".into(),
            password: "short".into(),
        })
        .await
        .unwrap_err();
    match err {
        AppError::Validation(errors) => {
            assert_eq!(errors.get("name"), Some("must be provided"));
            assert_eq!(errors.get("password"), Some("must be at least 8 bytes long"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(ledger.list_users().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_get_user_not_found() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;

    let err = ledger.get_user(7).await.unwrap_err();
    assert!(matches!(err, AppError::UserNotFound(7)));
    Ok(())
}

#[tokio::test]
async fn test_user_profile_shows_owned_and_rented_car() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;

    let (owner, car) = Fleet::owner_with_car(&ledger, "Olga", "Toyota", 20000).await?;
    let (renter, own_car) = Fleet::owner_with_car(&ledger, "Rita", "Fiat", 3000).await?;
    ledger.rent_car(renter.id, car.id, None).await?;

    let profile = ledger.get_user_profile(renter.id).await?;
    assert_eq!(profile.user.id, renter.id);
    assert_eq!(profile.owned_car.map(|c| c.id), Some(own_car.id));
    assert_eq!(profile.rental.map(|r| r.car_id), Some(car.id));
    assert_eq!(profile.rented_car.map(|c| c.brand), Some("Toyota".to_string()));

    let profile = ledger.get_user_profile(owner.id).await?;
    assert!(profile.rental.is_none());
    assert!(profile.rented_car.is_none());
    assert!(profile.owned_car.is_some_and(|c| c.is_used));
    Ok(())
}
