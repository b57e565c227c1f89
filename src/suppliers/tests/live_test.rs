//! Hits the real sites. Run with `cargo test -- --ignored`.

use crate::suppliers::{get_supplier, AllContentSuppliers, ContentSupplier};

#[test_log::test(tokio::test)]
#[ignore]
async fn should_load_default_channels() {
    for name in crate::suppliers::avalaible_suppliers() {
        let sup = get_supplier(&name).unwrap();
        for channel in AllContentSuppliers::get_default_channels(&sup) {
            match AllContentSuppliers::load_channel(&sup, channel.clone(), 1).await {
                Ok(res) => println!("{name}/{channel}: {} items", res.len()),
                Err(err) => println!("{name}/{channel}: {err}"),
            }
        }
    }
}

#[test_log::test(tokio::test)]
#[ignore]
async fn should_search() {
    let sup = get_supplier("FaselHD").unwrap();
    let res = AllContentSuppliers::search(&sup, "Breaking Bad".into())
        .await
        .unwrap();
    println!("{res:#?}");
    assert!(!res.is_empty())
}

#[test_log::test(tokio::test)]
#[ignore]
async fn should_load_content_details() {
    let sup = get_supplier("AnimeBlkom").unwrap();
    let res = AllContentSuppliers::get_content_details(&sup, "anime/one-piece".into())
        .await
        .unwrap();
    println!("{res:#?}");
}
