#[cfg(test)]
mod tests {
    use crate::error::BenchError;
    use crate::operation::{Operation, Workload, append_workload};

    fn usage_lines(text: &str) -> Vec<&str> {
        text.lines().filter(|line| line.starts_with("using x_")).collect()
    }

    #[test]
    fn generation_is_deterministic() {
        for op in Operation::ALL {
            for n in [0, 1, 7, 32] {
                assert_eq!(op.generate(n).render(), op.generate(n).render(), "{} at N={}", op, n);
            }
        }
    }

    #[test]
    fn usage_count_matches_size() {
        for op in Operation::ALL {
            for n in [0, 1, 2, 10, 50] {
                let workload = op.generate(n);
                assert_eq!(workload.usage_count(), n);
                assert_eq!(usage_lines(&workload.render()).len(), n, "{} at N={}", op, n);
            }
        }
    }

    #[test]
    fn zero_size_is_preamble_only() {
        for op in Operation::ALL {
            let workload = op.generate(0);
            assert!(workload.usages.is_empty());
            let text = workload.render();
            assert!(text.starts_with("template<int"));
            assert!(text.ends_with(";\n"));
            assert_eq!(text.lines().count(), 1);
        }
    }

    #[test]
    fn at_three_matches_expected_text() {
        let text = Operation::At.generate(3).render();
        assert_eq!(
            text,
            "template<int> struct x;\n\
             using x_0 = at<0, x<0>,x<1>,x<2>>;\n\
             using x_1 = at<1, x<0>,x<1>,x<2>>;\n\
             using x_2 = at<2, x<0>,x<1>,x<2>>;\n"
        );
    }

    #[test]
    fn argument_shapes_per_operation() {
        assert_eq!(
            Operation::Insert.generate(2).usages[1],
            "using x_1 = insert<1, void, x<0>,x<1>>;\n"
        );
        assert_eq!(Operation::Reverse.generate(2).usages[0], "using x_0 = reverse<x<0>,x<1>>;\n");
        assert_eq!(
            Operation::Unique.generate(2).usages[0],
            "using x_0 = unique<x<0>,x<1>, x<0>,x<1>>;\n"
        );
        let filter = Operation::Filter.generate(1);
        assert!(filter.preamble.contains("static constexpr auto value = N;"));
        assert_eq!(filter.usages[0], "using x_0 = filter<x<0>>;\n");
    }

    #[test]
    fn larger_sizes_keep_the_same_shape() {
        for op in Operation::ALL {
            let small = op.generate(4);
            let large = op.generate(9);
            assert_eq!(small.preamble, large.preamble);
            assert!(large.usage_count() > small.usage_count());
            let prefix = format!("using x_0 = {}<", op);
            assert!(small.usages[0].starts_with(&prefix));
            assert!(large.usages[0].starts_with(&prefix));
        }
    }

    #[test]
    fn parse_round_trips_names() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let err = "rotate".parse::<Operation>().unwrap_err();
        assert!(matches!(err, BenchError::UnknownOperation { ref name } if name == "rotate"));
        assert!(err.is_configuration());
    }

    #[test]
    fn append_inserts_missing_newline() {
        let workload = Workload {
            preamble: "template<int> struct x;\n".to_string(),
            usages: Vec::new(),
        };
        assert_eq!(
            append_workload("#include <mp.hpp>", &workload),
            "#include <mp.hpp>\ntemplate<int> struct x;\n"
        );
        assert_eq!(
            append_workload("#include <mp.hpp>\n", &workload),
            "#include <mp.hpp>\ntemplate<int> struct x;\n"
        );
        assert_eq!(append_workload("", &workload), "template<int> struct x;\n");
    }
}
