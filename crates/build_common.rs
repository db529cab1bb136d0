// README-to-rustdoc generation shared by every crate's build.rs.
// Include with: include!("../build_common.rs");
//
// The including file must import std::env, std::fs and std::path::Path.

/// Write `$OUT_DIR/README_GENERATED.md` for `#![doc = include_str!(...)]`.
///
/// Links written for GitHub are rewritten so they also work in rustdoc:
/// `src/foo.rs` becomes the `foo` module, and `../../README.md` becomes the
/// workspace `repository` URL. A crate without a README gets an empty page.
fn process_readme_for_rustdoc(crate_dir: &str) {
    println!("cargo:rerun-if-changed=README.md");
    println!("cargo:rerun-if-changed=../../Cargo.toml");

    let readme = fs::read_to_string(Path::new(crate_dir).join("README.md")).unwrap_or_default();

    let mut doc = readme.replace("](src/", "](").replace(".rs)", ")");
    if let Some(url) = workspace_repository(crate_dir) {
        doc = doc.replace("](../../README.md", &format!("]({url}"));
    }

    let out_dir = env::var("OUT_DIR").expect("cargo sets OUT_DIR for build scripts");
    fs::write(Path::new(&out_dir).join("README_GENERATED.md"), doc)
        .expect("failed to write README_GENERATED.md");
}

/// `repository = "..."` from the workspace manifest two levels up.
fn workspace_repository(crate_dir: &str) -> Option<String> {
    let manifest = Path::new(crate_dir).parent()?.parent()?.join("Cargo.toml");
    let content = fs::read_to_string(manifest).ok()?;

    content.lines().map(str::trim).find_map(|line| {
        let value = line.strip_prefix("repository")?.trim_start().strip_prefix('=')?;
        let value = value.trim().strip_prefix('"')?;
        Some(value[..value.find('"')?].to_string())
    })
}
