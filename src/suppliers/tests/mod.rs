mod live_test;

use super::{avalaible_suppliers, get_supplier, AllContentSuppliers, ContentSupplier};
use crate::models::ContentType;

#[test]
fn should_list_all_suppliers() {
    assert_eq!(
        avalaible_suppliers(),
        vec![
            "AnimeBlkom",
            "Anime4up",
            "WitAnime",
            "EgiBest",
            "Egy1Best",
            "FaselHD",
            "RistoAnime",
        ]
    );
}

#[test]
fn should_reject_unknown_supplier() {
    assert!(get_supplier("Shahid4u").is_err());
}

#[test]
fn should_expose_channels_of_every_supplier() {
    for name in avalaible_suppliers() {
        let sup = get_supplier(&name).unwrap();
        let channels = AllContentSuppliers::get_channels(&sup);

        assert!(!channels.is_empty(), "{name} has no channels");
        for channel in AllContentSuppliers::get_default_channels(&sup) {
            assert!(channels.contains(&channel), "{name}: {channel} is not a channel");
        }
        assert_eq!(AllContentSuppliers::get_supported_languages(&sup), vec!["ar"]);
    }
}

#[test]
fn should_expose_supported_types() {
    let sup = get_supplier("FaselHD").unwrap();
    let types = AllContentSuppliers::get_supported_types(&sup);
    assert!(types.contains(&ContentType::Movie));
    assert!(types.contains(&ContentType::Series));

    let sup = get_supplier("RistoAnime").unwrap();
    assert!(AllContentSuppliers::get_supported_types(&sup).contains(&ContentType::Anime));
}

#[tokio::test]
async fn should_fail_on_unknown_channel() {
    let sup = get_supplier("EgiBest").unwrap();
    let res = AllContentSuppliers::load_channel(&sup, "Unknown".into(), 1).await;
    assert!(res.is_err());
}

#[tokio::test]
async fn should_return_empty_second_home_page() {
    let sup = get_supplier("WitAnime").unwrap();
    let res = AllContentSuppliers::load_channel(&sup, "Home".into(), 2)
        .await
        .unwrap();
    assert!(res.is_empty());
}
