use super::{CommandError, Context, ExitStatus, parse_args};
use crate::metadata::Timestamp;
use crate::naming::slugify;
use clap::Parser;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gallerist add", no_binary_name = true)]
struct AddArgs {
    /// Directory under the content root
    #[arg(long, value_name = "DIR")]
    dir: Option<PathBuf>,
    /// Page title; the file name is derived from it
    #[arg(required = true, num_args = 1..)]
    title: Vec<String>,
}

pub(super) fn run(ctx: &Context) -> Result<ExitStatus, CommandError> {
    let Some(args) = parse_args::<AddArgs>(&ctx.args)? else {
        return Ok(ExitStatus::SUCCESS);
    };
    let title = args.title.join(" ");
    let slug = slugify(&title);
    if slug.is_empty() {
        return Err(CommandError::EmptySlug(title));
    }

    let mut dir = ctx.paths().content;
    if let Some(sub) = &args.dir {
        dir.push(sub);
    }
    let path = dir.join(format!("{slug}.md"));
    if path.exists() {
        return Err(CommandError::Exists(path));
    }

    let source = page_source(&title, Timestamp::from_system_time(SystemTime::now()))?;
    fs::create_dir_all(&dir)?;
    fs::write(&path, source)?;
    info!(path = %path.display(), "created page");
    println!("Created {}", path.display());
    Ok(ExitStatus::SUCCESS)
}

fn page_source(title: &str, date: Timestamp) -> Result<String, serde_yaml::Error> {
    let mut front = Mapping::new();
    front.insert(Value::from("title"), Value::from(title));
    front.insert(Value::from("date"), Value::from(date.canonical()));
    let yaml = serde_yaml::to_string(&front)?;
    Ok(format!("---\n{yaml}---\n\n# {title}\n"))
}

#[cfg(test)]
mod tests {
    use super::super::tests::context;
    use super::super::{CommandError, DispatchError, dispatch};
    use super::*;
    use crate::test_helpers::TestSite;

    #[test]
    fn creates_slugged_page_with_front_matter() {
        let site = TestSite::new();
        dispatch("add", &context(&site, &["--dir", "journal", "First", "Light:", "Ridge"])).unwrap();

        let path = site.path("content/journal/first-light-ridge.md");
        let source = fs::read_to_string(&path).unwrap();
        assert!(source.starts_with("---\n"));
        assert!(source.ends_with("# First Light: Ridge\n"));
        let yaml = source.trim_start_matches("---\n").split("---\n").next().unwrap();
        let front: Mapping = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(front.get("title").and_then(Value::as_str), Some("First Light: Ridge"));
        let date = front.get("date").and_then(Value::as_str).unwrap();
        assert!(Timestamp::parse(date).is_ok());
    }

    #[test]
    fn front_matter_quotes_yaml_sensitive_titles() {
        let date = Timestamp::parse("2024-05-01T08:00:00").unwrap();
        let source = page_source("yes: no # maybe", date).unwrap();
        let yaml = source.trim_start_matches("---\n").split("---\n").next().unwrap();
        let front: Mapping = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(front.get("title").and_then(Value::as_str), Some("yes: no # maybe"));
        assert_eq!(
            front.get("date").and_then(Value::as_str),
            Some("2024-05-01T08:00:00")
        );
    }

    #[test]
    fn refuses_to_overwrite() {
        let site = TestSite::new();
        site.write("content/about.md", "# Mine\n");
        let err = dispatch("add", &context(&site, &["About"])).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Execution {
                source: CommandError::Exists(_),
                ..
            }
        ));
        assert_eq!(fs::read_to_string(site.path("content/about.md")).unwrap(), "# Mine\n");
    }

    #[test]
    fn title_without_letters_is_rejected() {
        let site = TestSite::new();
        let err = dispatch("add", &context(&site, &["???"])).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Execution {
                source: CommandError::EmptySlug(_),
                ..
            }
        ));
    }
}
