#[cfg(test)]
pub mod test {
    use crate::types::{CanonicalPair, Scalar};

    /// The same configuration written as JSON, YAML and TOML.
    pub const JSON_DOC: &str = r#"{
  "app": {
    "name": "myapp",
    "api_url": "https://api.example.com",
    "config": {
      "host": "localhost",
      "port": 8080,
      "debug": false,
      "ratio": 0.75
    }
  }
}"#;

    pub const YAML_DOC: &str = "\
app:
  name: myapp
  api_url: https://api.example.com
  config:
    host: localhost
    port: 8080
    debug: false
    ratio: 0.75
";

    pub const TOML_DOC: &str = r#"
[app]
name = "myapp"
api_url = "https://api.example.com"

[app.config]
host = "localhost"
port = 8080
debug = false
ratio = 0.75
"#;

    /// An `etcdctl get --prefix` style dump.
    pub const FLAT_DOC: &str = "\
/app/name
myapp

/app/config/port
8080

/app/motd
welcome
to myapp
";

    /// Non-colliding pairs covering every scalar type.
    pub fn sample_pairs() -> Vec<CanonicalPair> {
        vec![
            CanonicalPair::new("/app/name", "myapp"),
            CanonicalPair::new("/app/config/host", "localhost"),
            CanonicalPair::new("/app/config/port", 8080i64),
            CanonicalPair::new("/app/config/ratio", 0.75),
            CanonicalPair::new("/app/config/debug", false),
            CanonicalPair::new("/app/config/tls/ca", ""),
            CanonicalPair::new("/app/legacy", Scalar::Null),
            CanonicalPair::new("/other", "x"),
        ]
    }

    #[test]
    fn sample_pairs_have_unique_keys() {
        let pairs = sample_pairs();
        let mut keys: Vec<&str> = pairs.iter().map(|p| p.key.as_str()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), pairs.len());
    }
}
