use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const SOURCE_STACK: &str = r#"
stack "TestAwsManagedPL"

options {
    vpc-id "vpc-21d8cd46"
    subnets "subnet-d9b34abf" "subnet-de0de396"
    domain-name "test-pl.example.org"
    main-domain-name "example.org"
    instance-type "small"
    instance-class "t3"
    ami "bitnami-nginx-1.20.2"
    key-name "staging-key"
    region "ap-southeast-1"
}

network "vpc"

security-group "ec2-sg" {
    network "vpc"
    ingress protocol="tcp" port=80 peer="172.31.0.0/16"
}

security-group "alb-sg" {
    network "vpc"
    ingress protocol="tcp" port=443 peer="0.0.0.0/0"
}

compute "ec2" {
    network "vpc"
    security-group "ec2-sg"
}

target-group "tg" {
    network "vpc"
    target "ec2"
}

load-balancer "alb" {
    security-group "alb-sg"
}

certificate "alb-cert"

certificate "edge-cert" region="global"

listener "https" {
    load-balancer "alb"
    certificate "alb-cert"
    target-group "tg"
}

distribution "cdn" {
    load-balancer "alb"
    certificate "edge-cert"
}

dns-record "alias" {
    distribution "cdn"
}
"#;

/// Temporary project directory with its own config home
pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_stack_kdl(&self, content: &str) {
        fs::write(self.root.path().join("stack.kdl"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_settings(&self, content: &str) {
        let dir = self.root.path().join("config").join("stackweave");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("settings.yaml"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// `weave` running inside the project, isolated from the user's config
    pub fn weave(&self) -> Command {
        let mut cmd = Command::cargo_bin("weave").unwrap();
        cmd.current_dir(self.path())
            .env_remove("STACKWEAVE_STACK_PATH")
            .env_remove("STACKWEAVE_EDGE_REGION")
            .env_remove("STACKWEAVE_MAX_CONCURRENCY")
            .env_remove("RUST_LOG")
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join("config"));
        cmd
    }
}
