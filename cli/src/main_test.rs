mod tests {
    use crate::*;

    fn parse_run(args: &[&str]) -> RunArgs {
        let mut argv = vec!["ctbench", "run"];
        argv.extend_from_slice(args);
        match CliArgs::try_parse_from(argv).expect("should parse").command {
            Commands::Run(args) => args,
            other => panic!("expected run command, got {:?}", other),
        }
    }

    fn configured() -> BenchConfig {
        BenchConfig::from_toml(
            r#"
repetitions = 5
[sizes]
start = 0
end = 50
[[toolchain]]
label = "clang"
program = "clang++"
suts = ["mp"]
[[toolchain]]
label = "gcc"
program = "g++"
"#,
        )
        .expect("valid config")
    }

    #[test]
    fn test_generate_parses_operation() {
        let args = CliArgs::try_parse_from(["ctbench", "generate", "unique", "4"]).expect("should parse");
        match args.command {
            Commands::Generate { operation, size } => {
                assert_eq!(operation, Operation::Unique);
                assert_eq!(size, 4);
            }
            other => panic!("expected generate command, got {:?}", other),
        }
    }

    #[test]
    fn test_generate_rejects_unknown_operation() {
        let err = CliArgs::try_parse_from(["ctbench", "generate", "rotate", "4"]).unwrap_err();
        assert!(err.to_string().contains("unknown operation 'rotate'"));
    }

    #[test]
    fn test_adhoc_command_replaces_toolchains() {
        let args = parse_run(&["--label", "sh", "--", "sh", "-c", "true"]);
        assert_eq!(args.command, vec!["sh", "-c", "true"]);

        let mut config = configured();
        apply_overrides(&mut config, &args).expect("overrides apply");
        assert_eq!(config.toolchains.len(), 1);
        assert_eq!(config.toolchains[0].label, "sh");
        assert_eq!(config.toolchains[0].program, "sh");
        assert_eq!(config.toolchains[0].args, vec!["-c", "true"]);
    }

    #[test]
    fn test_toolchain_selection() {
        let mut config = configured();
        apply_overrides(&mut config, &parse_run(&["--toolchain", "gcc"])).expect("overrides apply");
        let labels: Vec<_> = config.toolchains.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["gcc"]);

        let mut config = configured();
        let err = apply_overrides(&mut config, &parse_run(&["--toolchain", "msvc"])).unwrap_err();
        assert!(err.to_string().contains("no toolchain labelled 'msvc'"));
    }

    #[test]
    fn test_label_requires_command() {
        let mut config = configured();
        assert!(apply_overrides(&mut config, &parse_run(&["--label", "x"])).is_err());
    }

    #[test]
    fn test_overrides_fold_into_config() {
        let mut config = configured();
        let args = parse_run(&[
            "--start", "3", "-r", "1", "--keep-going", "--baseline", "--statistic", "median", "--sut", "meta", "-j",
            "2",
        ]);
        apply_overrides(&mut config, &args).expect("overrides apply");
        assert_eq!(config.repetitions, 1);
        assert_eq!(config.sizes.sizes().unwrap(), vec![3]);
        assert_eq!(config.failure_policy, FailurePolicy::Skip);
        assert_eq!(config.statistic, Statistic::Median);
        assert!(config.baseline);
        assert_eq!(config.jobs, 2);
        assert_eq!(config.suts.as_deref(), Some(&["meta".to_string()][..]));
        assert!(config.toolchains.iter().all(|t| t.suts.is_none()));
    }

    #[test]
    fn test_size_range_override_keeps_configured_end() {
        let mut config = configured();
        apply_overrides(&mut config, &parse_run(&["--step", "10"])).expect("overrides apply");
        assert_eq!(config.sizes.sizes().unwrap(), vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_start_with_step_keeps_configured_end() {
        let mut config = configured();
        apply_overrides(&mut config, &parse_run(&["--start", "0", "--step", "5"])).expect("overrides apply");
        assert_eq!(config.sizes.sizes().unwrap(), vec![0, 5, 10, 15, 20, 25, 30, 35, 40, 45]);
    }

    #[test]
    fn test_step_without_any_end_is_rejected() {
        let mut config = BenchConfig::from_toml("[sizes]\nstart = 4\n").expect("valid config");
        let err = apply_overrides(&mut config, &parse_run(&["--step", "5"])).unwrap_err();
        assert!(err.to_string().contains("--step needs an end"));
    }

    #[test]
    fn test_show_operation_is_optional() {
        let args = CliArgs::try_parse_from(["ctbench", "show", "clang"]).expect("should parse");
        match args.command {
            Commands::Show { label, operation, .. } => {
                assert_eq!(label, "clang");
                assert!(operation.is_none());
            }
            other => panic!("expected show command, got {:?}", other),
        }
    }

    #[test]
    fn test_env_toggle() {
        assert!(!env_toggle_enabled("off"));
        assert!(!env_toggle_enabled("0"));
        assert!(env_toggle_enabled("debug"));
        assert_eq!(filter_expr_from("true"), None);
        assert_eq!(filter_expr_from("ctbench_core=debug"), Some("ctbench_core=debug".to_string()));
    }
}
