// End-to-end runs of the test case pipeline against a fake crossplane.

mod common;

use std::fs;

use common::{FakeCrossplane, Fixture, Reply, XRD};
use regex::Regex;
use xprin::config::Config;
use xprin::runner::result::TestStatus;
use xprin::runner::{SuiteRunner, TestCaseRunner};

const BASIC: &str = r#"
tests:
  - name: renders a bucket
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
    assertions:
      - name: three resources
        type: Count
        value: 3
      - name: pod exists
        type: Exists
        resource: Pod/test-pod
      - name: replicas
        type: FieldValue
        resource: Pod/test-pod
        field: spec.replicas
        operator: "=="
        value: 2
"#;

#[test]
fn passing_case_without_crds_never_validates() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(BASIC, &fake);

    let result = &suite.results[0];
    assert_eq!(result.status, TestStatus::Pass, "{:?}", result.error);
    assert!(result.error.is_none());
    assert_eq!(fake.subcommands(), vec!["render"]);
    let outputs = result.outputs.as_ref().unwrap();
    assert!(outputs.validate.is_none());
    assert_eq!(outputs.render_count, 3);
    assert!(outputs.rendered.contains_key("Bucket/bucket"));
    assert!(outputs.rendered.contains_key("Pod/test-pod"));
    assert_eq!(result.assertions.len(), 3);
    assert!(result.failed_assertions.is_empty());
    assert!(suite.passed());
}

#[test]
fn render_invocation_carries_inputs_and_flags() {
    let fixture = Fixture::new();
    fs::write(fixture.path().join("env.json"), "{}").unwrap();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: flags
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
      contextFiles:
        apiextensions.crossplane.io/environment: env.json
      contextValues:
        flag: true
"#,
        &fake,
    );
    assert_eq!(suite.results[0].status, TestStatus::Pass);

    let render = &fake.calls()[0];
    assert_eq!(render.program, "crossplane");
    assert_eq!(&render.args[..2], ["render", "--include-full-xr"]);
    assert!(render.args[2].ends_with("xr/xr.yaml"));
    assert!(render.args[3].ends_with("composition/composition.yaml"));
    assert!(render.args[4].ends_with("functions/functions.yaml"));
    let flag = render.args.iter().position(|a| a == "--context-values").unwrap();
    assert_eq!(render.args[flag + 1], "flag=true");
    let files = render.args.iter().position(|a| a == "--context-files").unwrap();
    assert!(render.args[files + 1].starts_with("apiextensions.crossplane.io/environment="));
    assert!(render.args[files + 1].ends_with("context-files/env.json"));
}

#[test]
fn validate_and_post_hook_failures_are_aggregated() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new().with_validate(Reply::fail("schema violation", 1));
    let suite = fixture.run(
        r#"
tests:
  - name: invalid bucket
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
      crds:
        - crds
    hooks:
      post-test:
        - name: cleanup
          run: echo cleanup-broke >&2; exit 3
"#,
        &fake,
    );

    let result = &suite.results[0];
    assert_eq!(result.status, TestStatus::Fail);
    assert!(result.validate_failed);
    assert!(result.outputs.as_ref().unwrap().validate.is_some());
    let error = result.error.as_deref().unwrap();
    let validate_at = error.find("validate failed with exit code 1").unwrap();
    let hook_at = error
        .find("post-test hook 'cleanup' failed with exit code 3")
        .unwrap();
    assert!(validate_at < hook_at);
    assert!(error.contains("schema violation"));
    assert!(error.contains("cleanup-broke"));

    let validate = &fake.calls()[1];
    assert_eq!(&validate.args[..2], ["beta", "validate"]);
    assert!(validate.args.last().unwrap().ends_with("rendered.yaml"));
}

#[test]
fn render_failure_skips_the_rest_of_the_pipeline() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new().with_render(Reply::fail("function not found", 1));
    let suite = fixture.run(
        r#"
tests:
  - name: broken render
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
      crds: [crds]
    hooks:
      post-test:
        - run: touch post-hook-ran
"#,
        &fake,
    );

    let result = &suite.results[0];
    assert_eq!(result.status, TestStatus::Fail);
    assert!(result.render_failed);
    assert!(result.error.is_none());
    assert!(result.outputs.is_none());
    assert!(result.raw_render_output.contains("function not found"));
    assert!(result.formatted_render_output.contains("exit code 1"));
    assert_eq!(fake.subcommands(), vec!["render"]);
    assert!(!fixture.path().join("post-hook-ran").exists());
}

#[test]
fn pre_test_hook_failure_aborts_before_render() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: guarded
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
    hooks:
      pre-test:
        - name: first
          run: exit 2
        - name: second
          run: touch second-ran
"#,
        &fake,
    );

    let result = &suite.results[0];
    assert_eq!(result.status, TestStatus::Fail);
    assert!(result.error.as_deref().unwrap().contains("pre-test hook 'first' failed with exit code 2"));
    assert_eq!(result.pre_test_hooks.len(), 1);
    assert!(fake.calls().is_empty());
    assert!(!fixture.path().join("second-ran").exists());
}

#[test]
fn pre_test_hooks_cannot_see_outputs() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: too early
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
    hooks:
      pre-test:
        - run: cat {{ .Outputs.XR }}
"#,
        &fake,
    );

    let error = suite.results[0].error.clone().unwrap();
    assert!(error.contains("failed to render"), "{error}");
    assert!(fake.calls().is_empty());
}

#[test]
fn later_test_cases_reference_earlier_artifacts() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: base
    id: base
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
  - name: follow-up
    inputs:
      xr: {{ .Tests.base.Outputs.XR }}
      composition: composition.yaml
      functions: functions.yaml
    hooks:
      pre-test:
        - name: base render kept
          run: test -f {{ .Tests.base.Outputs.Render }}
      post-test:
        - name: count
          run: test {{ .Outputs.RenderCount }} -eq 3
"#,
        &fake,
    );

    let base = &suite.results[0];
    let follow = &suite.results[1];
    assert_eq!(base.status, TestStatus::Pass, "{:?}", base.error);
    assert_eq!(follow.status, TestStatus::Pass, "{:?}", follow.error);
    let render = &base.outputs.as_ref().unwrap().render;
    assert!(render.to_string_lossy().contains("xprin-artifacts-"));
    assert!(render.ends_with("base/rendered.yaml"));
    assert_eq!(follow.post_test_hooks.len(), 1);
    assert_eq!(follow.post_test_hooks[0].command, "test {{ .Outputs.RenderCount }} -eq 3");
}

#[test]
fn templated_assertions_and_context_values_keep_their_types() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: base
    id: base
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
  - name: follow
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
      contextValues:
        count: {{ .Tests.base.Outputs.RenderCount }}
        pod: Pod/test-pod
        field: spec.replicas
    assertions:
      - name: same count as {{ .Tests.base.Name }}
        type: Count
        value: {{ .Tests.base.Outputs.RenderCount }}
      - name: replicas
        type: FieldValue
        resource: {{ .Inputs.ContextValues.pod }}
        field: {{ .Inputs.ContextValues.field }}
        operator: "=="
        value: 2
"#,
        &fake,
    );

    let follow = &suite.results[1];
    assert_eq!(follow.status, TestStatus::Pass, "{:?}", follow.error);
    assert_eq!(follow.assertions[0].name, "same count as base");
    assert_eq!(follow.assertions.len(), 2);

    let render = &fake.calls()[1];
    let values: Vec<&String> = render
        .args
        .iter()
        .zip(render.args.iter().skip(1))
        .filter(|(flag, _)| *flag == "--context-values")
        .map(|(_, value)| value)
        .collect();
    assert!(values.iter().any(|v| *v == "count=3"), "{values:?}");
    assert!(values.iter().any(|v| *v == "pod=\"Pod/test-pod\""), "{values:?}");
}

#[test]
fn templated_assertion_resource_must_resolve() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: dangling
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
    assertions:
      - name: pod
        type: Exists
        resource: {{ .Inputs.ContextValues.missing }}
"#,
        &fake,
    );

    let result = &suite.results[0];
    assert_eq!(result.status, TestStatus::Fail);
    assert!(result.error.as_deref().unwrap().contains("missing"), "{:?}", result.error);
}

#[test]
fn completed_test_without_render_exposes_no_outputs() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: base
    id: base
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
    hooks:
      pre-test:
        - run: exit 1
  - name: follow
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
    hooks:
      post-test:
        - run: test -f {{ .Tests.base.Outputs.Render }}
"#,
        &fake,
    );

    assert!(suite.results[0].outputs.is_none());
    let follow = &suite.results[1];
    assert_eq!(follow.status, TestStatus::Fail);
    let error = follow.error.as_deref().unwrap();
    assert!(error.contains("not available"), "{error}");
}

#[test]
fn optional_render_inputs_are_passed_as_flags() {
    let fixture = Fixture::new();
    for file in ["observed.yaml", "extra.yaml", "credentials.yaml"] {
        fs::write(fixture.path().join(file), "apiVersion: v1\nkind: Secret\n").unwrap();
    }
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: with extras
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
      observedResources: observed.yaml
      extraResources: extra.yaml
      functionCredentials: credentials.yaml
"#,
        &fake,
    );
    assert_eq!(suite.results[0].status, TestStatus::Pass, "{:?}", suite.results[0].error);

    let render = &fake.calls()[0];
    let after = |flag: &str| {
        let at = render.args.iter().position(|a| a == flag).unwrap();
        render.args[at + 1].clone()
    };
    assert!(after("--observed-resources").ends_with("observed-resources/observed.yaml"));
    assert!(after("--extra-resources").ends_with("extra-resources/extra.yaml"));
    assert!(after("--function-credentials").ends_with("function-credentials/credentials.yaml"));
}

#[test]
fn xrd_defaults_reach_render() {
    let fixture = Fixture::new();
    fs::write(fixture.path().join("xrd.yaml"), XRD).unwrap();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: defaulted
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
    patches:
      xrd: xrd.yaml
"#,
        &fake,
    );

    assert_eq!(suite.results[0].status, TestStatus::Pass, "{:?}", suite.results[0].error);
    assert!(fake.calls()[0].args[2].ends_with("patched-xr.yaml"));
    let composite: serde_yaml::Value = serde_yaml::from_str(&fake.composites()[0]).unwrap();
    assert_eq!(composite["spec"]["versioning"].as_bool(), Some(false));
    assert_eq!(composite["spec"]["region"].as_str(), Some("eu-west-1"));
}

#[test]
fn claims_are_converted_before_render() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: from claim
    inputs:
      claim: claim.yaml
      composition: composition.yaml
      functions: functions.yaml
"#,
        &fake,
    );

    assert_eq!(suite.results[0].status, TestStatus::Pass);
    let render = &fake.calls()[0];
    assert!(render.args[2].ends_with("xr-from-claim.yaml"));
}

#[test]
fn connection_secret_patch_reaches_render() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: secret
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
    patches:
      connectionSecret: true
"#,
        &fake,
    );

    assert_eq!(suite.results[0].status, TestStatus::Pass);
    let composite = &fake.calls()[0].args[2];
    assert!(composite.ends_with("patched-xr.yaml"));
}

#[test]
fn secret_details_without_flag_are_rejected() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: secret
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
    patches:
      connectionSecretName: creds
"#,
        &fake,
    );

    let error = suite.results[0].error.clone().unwrap();
    assert!(error.contains("require connectionSecret: true"), "{error}");
    assert!(fake.calls().is_empty());
}

#[test]
fn missing_paths_are_reported_together() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: missing
    inputs:
      xr: nope-xr.yaml
      composition: nope-composition.yaml
      functions: functions.yaml
"#,
        &fake,
    );

    let error = suite.results[0].error.clone().unwrap();
    assert!(error.contains("xr:"), "{error}");
    assert!(error.contains("composition:"), "{error}");
    assert!(!error.contains("functions:"), "{error}");
}

#[test]
fn invalid_test_cases_fail_before_any_command() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: both
    inputs:
      xr: xr.yaml
      claim: claim.yaml
      composition: composition.yaml
      functions: functions.yaml
"#,
        &fake,
    );

    let error = suite.results[0].error.clone().unwrap();
    assert!(error.contains("only one is allowed"), "{error}");
    assert!(fake.calls().is_empty());
}

#[test]
fn assertion_failures_are_reported_with_details() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
tests:
  - name: wrong count
    inputs:
      xr: xr.yaml
      composition: composition.yaml
      functions: functions.yaml
    assertions:
      - name: count
        type: Count
        value: 5
      - name: gone
        type: NotExists
        resource: Pod/test-pod
      - name: still checked
        type: Exists
        resource: Pod/test-pod
"#,
        &fake,
    );

    let result = &suite.results[0];
    assert_eq!(result.status, TestStatus::Fail);
    assert_eq!(result.assertions.len(), 3);
    assert_eq!(result.failed_assertions.len(), 2);
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("2 of 3 assertions failed"), "{error}");
    assert!(error.contains("expected 5 resources, got 3"), "{error}");
}

#[test]
fn common_inputs_fill_unset_fields() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite = fixture.run(
        r#"
common:
  inputs:
    composition: composition.yaml
    functions: functions.yaml
tests:
  - name: uses common
    inputs:
      xr: xr.yaml
"#,
        &fake,
    );

    assert_eq!(suite.results[0].status, TestStatus::Pass, "{:?}", suite.results[0].error);
}

#[test]
fn run_filter_skips_non_matching_cases() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite_file = fixture.write_suite(
        r#"
common:
  inputs:
    xr: xr.yaml
    composition: composition.yaml
    functions: functions.yaml
tests:
  - name: bucket
  - name: queue
"#,
    );
    let runner = TestCaseRunner::new(Config::default()).with_command_runner(fake.clone());
    let suite = SuiteRunner::new(&runner)
        .with_filter(Some(Regex::new("^buck").unwrap()))
        .run_file(&suite_file)
        .unwrap();

    assert_eq!(suite.results[0].status, TestStatus::Pass);
    assert_eq!(suite.results[1].status, TestStatus::Skip);
    assert_eq!(suite.count(TestStatus::Skip), 1);
    assert!(suite.passed());
    assert_eq!(fake.subcommands(), vec!["render"]);
}

#[test]
fn duplicate_ids_reject_the_suite() {
    let fixture = Fixture::new();
    let suite_file = fixture.write_suite(
        r#"
tests:
  - name: a
    id: same
  - name: b
    id: same
"#,
    );
    let runner = TestCaseRunner::new(Config::default()).with_command_runner(FakeCrossplane::new());
    let err = SuiteRunner::new(&runner).run_file(&suite_file).unwrap_err();
    assert!(err.to_string().contains("duplicate test id 'same'"));
}

/// Converter that ignores the claim and hands back a fixed composite.
struct CannedConverter(std::path::PathBuf);

impl xprin::convert::ClaimConverter for CannedConverter {
    fn convert(&self, _claim: &std::path::Path, _out_dir: &std::path::Path) -> xprin::Result<std::path::PathBuf> {
        Ok(self.0.clone())
    }
}

#[test]
fn injected_claim_converter_is_used() {
    let fixture = Fixture::new();
    let fake = FakeCrossplane::new();
    let suite_file = fixture.write_suite(
        r#"
tests:
  - name: injected
    inputs:
      claim: claim.yaml
      composition: composition.yaml
      functions: functions.yaml
"#,
    );
    let canned = fixture.path().join("xr.yaml");
    let runner = TestCaseRunner::new(Config::default())
        .with_command_runner(fake.clone())
        .with_claim_converter(CannedConverter(canned.clone()));
    let suite = SuiteRunner::new(&runner).run_file(&suite_file).unwrap();

    assert_eq!(suite.results[0].status, TestStatus::Pass);
    assert_eq!(fake.calls()[0].args[2], canned.display().to_string());
}
