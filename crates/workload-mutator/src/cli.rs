use clap::builder::PossibleValue;
use clap::{crate_description, crate_name, crate_version, Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    let mut args = vec![
        Arg::new("log-level")
            .long("log-level")
            .value_name("LOG_LEVEL")
            .env("MUTATOR_LOG_LEVEL")
            .default_value("info")
            .value_parser([
                PossibleValue::new("trace"),
                PossibleValue::new("debug"),
                PossibleValue::new("info"),
                PossibleValue::new("warn"),
                PossibleValue::new("error"),
            ])
            .help("Log level"),
        Arg::new("log-fmt")
            .long("log-fmt")
            .value_name("LOG_FMT")
            .env("MUTATOR_LOG_FMT")
            .default_value("text")
            .value_parser([PossibleValue::new("text"), PossibleValue::new("json")])
            .help("Log output format"),
        Arg::new("log-no-color")
            .long("log-no-color")
            .env("NO_COLOR")
            .action(ArgAction::SetTrue)
            .help("Disable colored output for logs"),
        Arg::new("address")
            .long("addr")
            .value_name("BIND_ADDRESS")
            .default_value("0.0.0.0")
            .env("MUTATOR_BIND_ADDRESS")
            .help("Bind against ADDRESS"),
        Arg::new("port")
            .long("port")
            .value_name("PORT")
            .default_value("443")
            .env("MUTATOR_PORT")
            .help("Listen on PORT"),
        Arg::new("cert-file")
            .long("cert-file")
            .value_name("CERT_FILE")
            .default_value("/run/secrets/tls/tls.crt")
            .env("MUTATOR_CERT_FILE")
            .help("Path to an X.509 certificate file for HTTPS, an empty value serves plain HTTP"),
        Arg::new("key-file")
            .long("key-file")
            .value_name("KEY_FILE")
            .default_value("/run/secrets/tls/tls.key")
            .env("MUTATOR_KEY_FILE")
            .help("Path to an X.509 private key file for HTTPS, an empty value serves plain HTTP"),
        Arg::new("mode")
            .long("mode")
            .value_name("MODE")
            .default_value("dns")
            .env("MUTATOR_MODE")
            .value_parser([
                PossibleValue::new("dns")
                    .help("Propagate the DnsConfig policy to Pods and Deployments"),
                PossibleValue::new("security-defaults")
                    .help("Inject readiness and liveness probes into containers lacking them"),
            ])
            .help("Mutation rules served by the webhook"),
        Arg::new("controller-namespace")
            .long("controller-namespace")
            .value_name("NAMESPACE")
            .default_value("webhook-demo")
            .env("MUTATOR_CONTROLLER_NAMESPACE")
            .help("Namespace hosting the webhook itself, never mutated in security-defaults mode"),
    ];
    args.sort_by(|a, b| a.get_id().cmp(b.get_id()));

    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .args(args)
}
