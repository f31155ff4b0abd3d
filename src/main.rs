use std::sync::Arc;

use anyhow::{bail, Context, Result};
use salesdash::config::Config;
use salesdash::drill::DrillAction;
use salesdash::fetchers::DataClient;
use salesdash::logging::{self, obj, v_str, Domain, Level};
use salesdash::rpc::SupabaseBackend;
use salesdash::url_state;
use salesdash::view::Dashboard;

#[derive(Debug, Default)]
struct Args {
    query: String,
    drill: Vec<DrillAction>,
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut args = Args::default();
    let mut it = raw.iter();
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| {
            it.next()
                .cloned()
                .with_context(|| format!("{} needs a value", flag))
        };
        match arg.as_str() {
            "--brand" => args.drill.push(DrillAction::SelectBrand(value("--brand")?)),
            "--category" => args.drill.push(DrillAction::SelectCategory(value("--category")?)),
            "--sub-brand" => args.drill.push(DrillAction::SelectSubBrand(value("--sub-brand")?)),
            flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
            query => args.query = query.to_string(),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw)?;

    let cfg = Config::from_env();
    logging::init(&cfg);

    let backend = SupabaseBackend::new(&cfg).context("build http client")?;
    let client = DataClient::new(Arc::new(backend), &cfg);

    let config = url_state::from_query(&args.query);
    if config.measures().is_none() {
        logging::log(
            Level::Warn,
            Domain::View,
            "measures_missing",
            obj(&[("msg", v_str("select a value and target measure to load KPI panels"))]),
        );
    }

    let mut dashboard = Dashboard::new(config, cfg.top_n_limit);
    for action in args.drill {
        dashboard.dispatch(action);
    }
    dashboard.refresh(&client).await;

    let out = serde_json::to_string_pretty(&dashboard.snapshot()).context("serialize snapshot")?;
    println!("{}", out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args_drill_flags() {
        let args = parse_args(&strings(&["filters=%7B%7D", "--brand", "Acme", "--category", "Snacks"])).unwrap();
        assert_eq!(args.query, "filters=%7B%7D");
        assert_eq!(
            args.drill,
            vec![
                DrillAction::SelectBrand("Acme".to_string()),
                DrillAction::SelectCategory("Snacks".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_args_rejects_missing_value() {
        assert!(parse_args(&strings(&["--brand"])).is_err());
        assert!(parse_args(&strings(&["--verbose"])).is_err());
    }
}
