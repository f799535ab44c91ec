use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

/// Pure clap command definitions with zero business logic
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .after_help(
            "Without --dsn the target is read from POSTGRES_HOST, POSTGRES_PORT, \
            POSTGRES_USER, POSTGRES_PASSWORD, POSTGRES_DB and POSTGRES_SSLMODE, \
            defaulting to admin@localhost:5432/maindb with sslmode=require.",
        )
        .arg(
            Arg::new("dsn")
                .env("PGPROBE_DSN")
                .help("postgres://<username>:<password>@tcp(<host>:<port>)/<database>?sslmode=<mode>")
                .long("dsn")
                .short('d')
                .hide_env_values(true),
        )
        .arg(
            Arg::new("table")
                .default_value("users")
                .env("PGPROBE_TABLE")
                .help("table counted by the sample query (optionally schema.table)")
                .long("table")
                .short('t')
                .value_name("TABLE"),
        )
        .arg(
            Arg::new("schema")
                .default_value("public")
                .env("PGPROBE_SCHEMA")
                .help("schema whose tables are listed")
                .long("schema")
                .short('s')
                .value_name("SCHEMA"),
        )
        .arg(
            Arg::new("strict")
                .help("fail the probe when the sample query fails")
                .long("strict")
                .long_help(
                    "Fail the probe when the sample count query fails.\n\n\
                    By default a missing sample table is reported as a warning and the \
                    probe still succeeds, since connectivity was verified.",
                )
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-cert")
                .help("skip reading the server certificate")
                .long("no-cert")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("timeout")
                .default_value("30")
                .env("PGPROBE_TIMEOUT")
                .help("overall deadline for the probe in seconds")
                .long("timeout")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("format")
                .default_value("text")
                .env("PGPROBE_FORMAT")
                .help("report format")
                .long("format")
                .short('f')
                .value_parser(["text", "json"]),
        )
        .arg(
            Arg::new("tls-mode")
                .env("PGPROBE_TLS_MODE")
                .help("TLS/SSL mode: disable, require, verify-ca, verify-full")
                .long("tls-mode")
                .long_help(
                    "TLS/SSL connection mode, overrides the DSN or POSTGRES_SSLMODE:\n\n\
                    - disable: No TLS\n\
                    - require: TLS required, self-signed certificates accepted (default)\n\
                    - verify-ca: Verify server certificate against CA\n\
                    - verify-full: Verify certificate and hostname\n\n\
                    No mode falls back to an unencrypted connection.",
                )
                .value_name("MODE")
                .value_parser(["disable", "require", "verify-ca", "verify-full"]),
        )
        .arg(
            Arg::new("tls-ca")
                .env("PGPROBE_TLS_CA")
                .help("Path to CA certificate file for TLS verification")
                .long("tls-ca")
                .long_help(
                    "Path to Certificate Authority (CA) certificate file.\n\
                    Used by verify-ca and verify-full modes.\n\n\
                    Example: /etc/ssl/certs/ca-certificates.crt",
                )
                .value_name("PATH"),
        )
        .arg(
            Arg::new("tls-cert")
                .env("PGPROBE_TLS_CERT")
                .help("Path to client certificate file for TLS client authentication")
                .long("tls-cert")
                .value_name("PATH")
                .requires("tls-key"),
        )
        .arg(
            Arg::new("tls-key")
                .env("PGPROBE_TLS_KEY")
                .help("Path to client private key file for TLS client authentication")
                .long("tls-key")
                .value_name("PATH")
                .requires("tls-cert"),
        )
        .arg(
            Arg::new("verbose")
                .help("increase log verbosity (-v info, -vv debug, -vvv trace)")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count),
        )
}
