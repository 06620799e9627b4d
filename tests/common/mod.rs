//! # Shared fixtures for the xprin integration tests
//!
//! [`FakeCrossplane`] stands in for the crossplane binary: `render` and
//! `validate` invocations get scripted replies and are recorded, while shell
//! hooks still run for real.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use xprin::config::Config;
use xprin::runner::command::{CommandOutput, CommandRunner, Invocation, ProcessRunner};
use xprin::runner::{SuiteResult, SuiteRunner, TestCaseRunner};

pub const XR: &str = r#"apiVersion: example.org/v1
kind: XBucket
metadata:
  name: data
spec:
  region: eu-west-1
"#;

pub const CLAIM: &str = r#"apiVersion: example.org/v1
kind: Bucket
metadata:
  name: data
  namespace: team-a
spec:
  region: eu-west-1
"#;

pub const COMPOSITION: &str = r#"apiVersion: apiextensions.crossplane.io/v1
kind: Composition
metadata:
  name: xbuckets
spec:
  compositeTypeRef:
    apiVersion: example.org/v1
    kind: XBucket
"#;

pub const FUNCTIONS: &str = r#"apiVersion: pkg.crossplane.io/v1beta1
kind: Function
metadata:
  name: function-patch-and-transform
"#;

pub const CRD: &str = r#"apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: buckets.s3.aws.upbound.io
"#;

pub const XRD: &str = r#"apiVersion: apiextensions.crossplane.io/v1
kind: CompositeResourceDefinition
metadata:
  name: xbuckets.example.org
spec:
  names:
    kind: XBucket
  versions:
    - name: v1
      referenceable: true
      schema:
        openAPIV3Schema:
          type: object
          properties:
            spec:
              type: object
              properties:
                region:
                  type: string
                versioning:
                  type: boolean
                  default: false
"#;

/// Three documents: the XR, a managed bucket and a pod.
pub const RENDERED: &str = r#"---
apiVersion: example.org/v1
kind: XBucket
metadata:
  name: data
spec:
  region: eu-west-1
---
apiVersion: s3.aws.upbound.io/v1beta1
kind: Bucket
metadata:
  generateName: data-
  annotations:
    crossplane.io/composition-resource-name: bucket
spec:
  forProvider:
    region: eu-west-1
---
apiVersion: v1
kind: Pod
metadata:
  name: test-pod
spec:
  replicas: 2
"#;

// =============================================================================
// FAKE CROSSPLANE
// =============================================================================

#[derive(Debug, Clone)]
pub struct Reply {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: String::new(),
            code: 0,
        }
    }

    pub fn fail(stderr: &str, code: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.to_string(),
            code,
        }
    }
}

#[derive(Clone)]
pub struct FakeCrossplane {
    pub render: Reply,
    pub validate: Reply,
    pub calls: Arc<Mutex<Vec<Invocation>>>,
    /// Contents of the composite file each render was handed.
    pub composites: Arc<Mutex<Vec<String>>>,
    shell: ProcessRunner,
}

impl FakeCrossplane {
    pub fn new() -> Self {
        Self {
            render: Reply::ok(RENDERED),
            validate: Reply::ok("[✓] all resources are valid\n"),
            calls: Arc::new(Mutex::new(Vec::new())),
            composites: Arc::new(Mutex::new(Vec::new())),
            shell: ProcessRunner::default(),
        }
    }

    pub fn with_render(mut self, reply: Reply) -> Self {
        self.render = reply;
        self
    }

    pub fn with_validate(mut self, reply: Reply) -> Self {
        self.validate = reply;
        self
    }

    /// First word of the subcommand of every crossplane call, in order.
    pub fn subcommands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| c.args.first().cloned())
            .collect()
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn composites(&self) -> Vec<String> {
        self.composites.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeCrossplane {
    fn run(&self, invocation: &Invocation) -> xprin::Result<CommandOutput> {
        if invocation.program == "sh" {
            return self.shell.run(invocation);
        }
        self.calls.lock().unwrap().push(invocation.clone());
        let reply = match invocation.args.first().map(String::as_str) {
            Some("render") => {
                // The staged inputs are gone once the test case finishes.
                let composite = invocation.args.get(2).cloned().unwrap_or_default();
                let text = fs::read_to_string(composite).unwrap_or_default();
                self.composites.lock().unwrap().push(text);
                &self.render
            }
            _ => &self.validate,
        };
        Ok(CommandOutput {
            stdout: reply.stdout.clone().into_bytes(),
            stderr: reply.stderr.clone().into_bytes(),
            exit_code: Some(reply.code),
        })
    }
}

// =============================================================================
// SUITE FIXTURE
// =============================================================================

/// A directory holding the standard inputs plus one suite file.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("xr.yaml"), XR).unwrap();
        fs::write(root.join("claim.yaml"), CLAIM).unwrap();
        fs::write(root.join("composition.yaml"), COMPOSITION).unwrap();
        fs::write(root.join("functions.yaml"), FUNCTIONS).unwrap();
        fs::create_dir_all(root.join("crds")).unwrap();
        fs::write(root.join("crds/bucket.yaml"), CRD).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_suite(&self, body: &str) -> PathBuf {
        let path = self.dir.path().join("bucket_xprin.yaml");
        fs::write(&path, body).unwrap();
        path
    }

    /// Writes `body` as the suite and runs it with `fake` as crossplane.
    pub fn run(&self, body: &str, fake: &FakeCrossplane) -> SuiteResult {
        let suite = self.write_suite(body);
        let runner = TestCaseRunner::new(Config::default()).with_command_runner(fake.clone());
        SuiteRunner::new(&runner).run_file(&suite).unwrap()
    }
}
