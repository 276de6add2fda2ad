use std::{collections::BTreeMap, env, fs, path::PathBuf};

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let flags_str = fs::read_to_string(PathBuf::from(manifest_dir).join("defaults.json")).unwrap();
    let flagmap: BTreeMap<String, String> = serde_json::from_str(&flags_str).unwrap();
    make_flags(&flagmap);
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=defaults.json");
}

fn make_flags(flagmap: &BTreeMap<String, String>) {
    let mut s = String::new();
    for (key, value) in flagmap {
        if value.parse::<u64>().is_err() {
            panic!("Invalid value '{}' for default '{}'.", value, key);
        }
        s += format!("/// `{}` as declared in defaults.json\n", key).as_str();
        s += format!("pub const {}: u64 = {};\n", key, value).as_str();
    }
    let out_dir = env::var("OUT_DIR").unwrap();
    fs::write(PathBuf::from(out_dir).join("build_flags.rs"), s).unwrap();
}
