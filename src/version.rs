use std::sync::LazyLock;

/// Version of the software, as declared by the package manifest.
pub static VERSION: LazyLock<String> =
    LazyLock::new(|| format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")));
