//! Registry discovery and plugin units taking part in real builds.

#[path = "../src/test_helpers.rs"]
mod helpers;

use gallerist::commands::{self, Context, DispatchError};
use gallerist::config;
use gallerist::plugins::{PluginKind, PluginLoadError, Registry};
use helpers::TestSite;

const BUILTIN_COMMANDS: [&str; 8] = [
    "add",
    "build",
    "build-documentation",
    "clean",
    "publish",
    "serve",
    "tests",
    "watch",
];

fn command_names(registry: &Registry) -> Vec<&str> {
    registry
        .plugins(PluginKind::Command)
        .keys()
        .map(String::as_str)
        .collect()
}

#[test]
fn canonical_plugin_directory_has_exactly_the_builtin_commands() {
    let site = TestSite::new();
    std::fs::create_dir_all(site.path("plugins")).unwrap();
    let registry = Registry::discover(Some(&site.path("plugins"))).unwrap();
    assert_eq!(command_names(&registry), BUILTIN_COMMANDS);
    assert_eq!(
        registry.plugins(PluginKind::Handler).keys().collect::<Vec<_>>(),
        ["gallery", "page"]
    );
}

#[test]
fn duplicate_command_aborts_discovery() {
    let site = TestSite::new();
    site.write("plugins/bin/tool", "#!/bin/sh\n");
    site.write(
        "plugins/serve.toml",
        "name = \"serve\"\nkind = \"command\"\nentry_point = \"bin/tool\"\n",
    );
    let err = Registry::discover(Some(&site.path("plugins"))).unwrap_err();
    assert!(matches!(
        err,
        PluginLoadError::Duplicate { kind: PluginKind::Command, ref name, .. } if name == "serve"
    ));
}

#[test]
fn unknown_command_is_reported_with_choices() {
    let site = TestSite::new();
    let config = config::load_config(site.root()).unwrap();
    let ctx = Context::new(site.root(), config, Registry::builtin());
    match commands::dispatch("deploy", &ctx) {
        Err(DispatchError::UnknownCommand { available, .. }) => {
            assert_eq!(available, BUILTIN_COMMANDS)
        }
        other => panic!("expected unknown command, got {other:?}"),
    }
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn executable(path: &Path) {
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn dispatch(site: &TestSite, command: &str) -> commands::ExitStatus {
        let config = config::load_config(site.root()).unwrap();
        let registry = Registry::discover(Some(&site.path("plugins"))).unwrap();
        let ctx = Context::new(site.root(), config, registry);
        commands::dispatch(command, &ctx).unwrap()
    }

    #[test]
    fn external_handler_output_is_rendered() {
        let site = TestSite::new();
        let program = site.write(
            "plugins/bin/csv.sh",
            r#"#!/bin/sh
cat > /dev/null
name=$(basename "$1" .csv)
echo "[{\"output_path\": \"data/$name.html\", \"content\": \"<table></table>\", \"metadata\": {\"title\": \"Table $name\"}}]"
"#,
        );
        executable(&program);
        site.write(
            "plugins/csv.toml",
            "name = \"csv\"\nkind = \"handler\"\nentry_point = \"bin/csv.sh\"\nextensions = [\"csv\"]\n",
        );
        site.write("content/data/birds.csv", "species,count\nheron,3\n");
        site.write("content/data/birds.toml", "description = \"Spring count\"\n");

        assert!(dispatch(&site, "build").is_success());
        assert_eq!(
            fs::read_to_string(site.path("dist/data/birds.html")).unwrap(),
            "<table></table>"
        );
    }

    #[test]
    fn external_template_helper_lands_in_every_page() {
        let site = TestSite::new();
        let program = site.write(
            "plugins/bin/stamp.sh",
            "#!/bin/sh\ncat > /dev/null\necho '<p class=\"stamp\">made here</p>'\n",
        );
        executable(&program);
        site.write(
            "plugins/stamp.toml",
            "name = \"stamp\"\nkind = \"template-helper\"\nentry_point = \"bin/stamp.sh\"\n",
        );
        site.write("content/about.md", "# About\n");

        assert!(dispatch(&site, "build").is_success());
        for page in ["dist/index.html", "dist/about/index.html"] {
            let html = fs::read_to_string(site.path(page)).unwrap();
            assert!(html.contains("<p class=\"stamp\">made here</p>"), "{page}");
        }
    }

    #[test]
    fn failing_external_handler_is_an_item_error() {
        let site = TestSite::new();
        let program = site.write("plugins/bin/broken.sh", "#!/bin/sh\necho nope >&2\nexit 2\n");
        executable(&program);
        site.write(
            "plugins/broken.toml",
            "name = \"broken\"\nkind = \"handler\"\nentry_point = \"bin/broken.sh\"\nextensions = [\"raw\"]\n",
        );
        site.write("content/shot.raw", "raw");
        site.write("content/about.md", "# About\n");

        // the build completes; only the strict check fails
        assert!(dispatch(&site, "build").is_success());
        assert!(site.path("dist/about/index.html").is_file());
        assert!(!dispatch(&site, "tests").is_success());
    }
}
