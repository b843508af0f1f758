#[tokio::main]
async fn main() {
    use tracing::{level_filters::LevelFilter, Level};
    use tracing_subscriber::fmt::format::FmtSpan;
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_level(true)
        .with_span_events(FmtSpan::ACTIVE)
        .with_max_level(LevelFilter::from_level(Level::TRACE))
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();

    use porcupine::prelude::*;
    use std::sync::Arc;

    println!("running porcupine {}", porcupine::version::full_version());

    let mut rng = porcupine::utils::crypto_rng();

    let signing_key = SigningKey::generate(&mut rng);
    let symmetric_key = SymmetricKey::generate(&mut rng);
    let crypto = CryptoContext::new(signing_key, symmetric_key);

    let store = Arc::new(porcupine::stores::MemoryBlockStore::new());
    let descriptor = Descriptor {
        extent: 4_096,
        ..Descriptor::default()
    };

    let mut tree: Porcupine<Vec<u8>, Vec<u8>> = Porcupine::new(Context::new(descriptor, store, crypto));

    for n in 0..512u32 {
        let key = n.to_be_bytes().to_vec();
        let value = format!("block-{n}").into_bytes();
        tree.add(key, value).await.unwrap();
    }

    tree.check().await.unwrap();

    for n in 0..512u32 {
        let key = n.to_be_bytes().to_vec();
        let expected = format!("block-{n}").into_bytes();
        assert_eq!(tree.locate(&key).await.unwrap(), expected);
    }

    let page = tree.consult(100, 10).await.unwrap();
    println!("page of 10 starting at offset 100: {} entries", page.len());

    for n in (0..512u32).step_by(3) {
        tree.remove(&n.to_be_bytes().to_vec()).await.unwrap();
    }

    tree.check().await.unwrap();
    tree.checkpoint().await.unwrap();

    println!("porcupine exercise completed successfully");
}
