//! Built-in stack catalog for the to-do web application.
//!
//! Nine stacks: `network`, `certificate`, `domain`, `cognito`,
//! `docker-repository`, `database`, `messaging`, `activemq` and `service`.
//! Edges come only from the required inputs listed here.

use super::{ApplicationEnvironment, StackDescriptor};
use crate::errors::ConfigurationError;

/// Parameter carrying the deployable artifact reference (image tag or build id).
pub const ARTIFACT_PARAMETER: &str = "artifact";

const NETWORK_LOAD_BALANCER_OUTPUTS: [&str; 4] = [
    "loadBalancerArn",
    "loadBalancerDnsName",
    "loadBalancerCanonicalHostedZoneId",
    "loadBalancerSecurityGroupId",
];

const COGNITO_OUTPUTS: [&str; 5] = [
    "userPoolId",
    "userPoolClientId",
    "userPoolClientSecret",
    "logoutUrl",
    "providerUrl",
];

const DATABASE_OUTPUTS: [&str; 6] = [
    "endpointAddress",
    "endpointPort",
    "databaseName",
    "securityGroupId",
    "secretArn",
    "instanceId",
];

const MESSAGING_OUTPUTS: [&str; 2] = ["todoSharingQueueName", "todoSharingQueueUrl"];

const ACTIVEMQ_OUTPUTS: [&str; 5] = [
    "activeMqUsername",
    "activeMqPassword",
    "amqpEndpoint",
    "stompEndpoint",
    "activeMqSecurityGroupId",
];

/// Builds the catalog for an environment.
///
/// `artifact` is passed to the `service` stack unmodified; when absent the
/// parameter is left empty and must be supplied before `service` is deployed.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] if a context value a stack needs is missing.
pub fn todo_app_catalog(
    env: &ApplicationEnvironment,
    artifact: Option<&str>,
) -> Result<Vec<StackDescriptor>, ConfigurationError> {
    env.validate()?;

    Ok(vec![
        network(env),
        certificate(env)?,
        domain(env)?,
        cognito(env)?,
        docker_repository(env),
        database(env),
        messaging(env),
        activemq(env),
        service(env, artifact)?,
    ])
}

fn with_base(env: &ApplicationEnvironment, mut desc: StackDescriptor, physical_name: String) -> StackDescriptor {
    desc.parameters.extend(env.base_parameters(physical_name));
    desc
}

fn network(env: &ApplicationEnvironment) -> StackDescriptor {
    let desc = StackDescriptor::new("network")
        .with_declared_outputs(["vpcId", "ecsClusterName", "httpsListenerArn", "isolatedSubnetIds"])
        .with_declared_outputs(NETWORK_LOAD_BALANCER_OUTPUTS)
        .with_resource("Vpc", "AWS::EC2::VPC")
        .with_resource("EcsCluster", "AWS::ECS::Cluster")
        .with_resource("LoadBalancer", "AWS::ElasticLoadBalancingV2::LoadBalancer")
        .with_resource("HttpsListener", "AWS::ElasticLoadBalancingV2::Listener");
    with_base(env, desc, format!("{}-Network", env.environment_name))
}

fn certificate(env: &ApplicationEnvironment) -> Result<StackDescriptor, ConfigurationError> {
    let desc = StackDescriptor::new("certificate")
        .with_declared_output("sslCertArn")
        .with_resource("WebsiteCertificate", "AWS::CertificateManager::Certificate")
        .with_resource("sslCertARN", "AWS::SSM::Parameter")
        .with_parameter("hostedZoneDomain", env.hosted_zone_domain()?)
        .with_parameter("applicationDomain", env.application_domain()?);
    Ok(with_base(env, desc, env.prefix("SSLCert")))
}

fn domain(env: &ApplicationEnvironment) -> Result<StackDescriptor, ConfigurationError> {
    let mut desc = StackDescriptor::new("domain")
        .with_declared_outputs(["hostedZoneId", "recordName"])
        .with_resource("ARecord", "AWS::Route53::RecordSet")
        .with_parameter("hostedZoneDomain", env.hosted_zone_domain()?)
        .with_parameter("applicationDomain", env.application_domain()?);
    for key in NETWORK_LOAD_BALANCER_OUTPUTS {
        desc = desc.with_required_input("network", key);
    }
    Ok(with_base(env, desc, env.prefix("DNS")))
}

fn cognito(env: &ApplicationEnvironment) -> Result<StackDescriptor, ConfigurationError> {
    let desc = StackDescriptor::new("cognito")
        .with_declared_outputs(COGNITO_OUTPUTS)
        .with_resource("userPool", "AWS::Cognito::UserPool")
        .with_resource("userPoolClient", "AWS::Cognito::UserPoolClient")
        .with_resource("userPoolDomain", "AWS::Cognito::UserPoolDomain")
        .with_parameter("userPoolName", format!("{}-user-pool", env.application_name))
        .with_parameter("userPoolClientName", format!("{}-client", env.application_name))
        .with_parameter("applicationUrl", env.application_url()?)
        .with_parameter("loginPageDomainPrefix", env.login_page_domain_prefix()?)
        .with_parameter("logoutUrl", env.logout_url()?);
    Ok(with_base(env, desc, env.prefix("Cognito")))
}

fn docker_repository(env: &ApplicationEnvironment) -> StackDescriptor {
    let desc = StackDescriptor::new("docker-repository")
        .with_declared_outputs(["repositoryName", "repositoryUri"])
        .with_resource("DockerRepository", "AWS::ECR::Repository")
        .with_parameter("dockerRepositoryName", env.docker_repository_name())
        .with_parameter("maxImageCount", "10");
    with_base(env, desc, format!("{}-DockerRepository", env.application_name))
}

fn database(env: &ApplicationEnvironment) -> StackDescriptor {
    let desc = StackDescriptor::new("database")
        .with_declared_outputs(DATABASE_OUTPUTS)
        .with_required_input("network", "vpcId")
        .with_required_input("network", "isolatedSubnetIds")
        .with_resource("databaseSecurityGroup", "AWS::EC2::SecurityGroup")
        .with_resource("databaseSecret", "AWS::SecretsManager::Secret")
        .with_resource("dbSubnetGroup", "AWS::RDS::DBSubnetGroup")
        .with_resource("postgresInstance", "AWS::RDS::DBInstance")
        .with_parameter("engine", "postgres")
        .with_parameter("postgresVersion", "16.4")
        .with_parameter("instanceClass", "db.t4g.micro")
        .with_parameter("storageInGb", "20");
    with_base(env, desc, format!("{}-{}-Database", env.environment_name, env.application_name))
}

fn messaging(env: &ApplicationEnvironment) -> StackDescriptor {
    let desc = StackDescriptor::new("messaging")
        .with_declared_outputs(MESSAGING_OUTPUTS)
        .with_resource("todoSharingDlq", "AWS::SQS::Queue")
        .with_resource("todoSharingQueue", "AWS::SQS::Queue")
        .with_parameter("queueName", env.prefix("todo-sharing-queue"))
        .with_parameter("deadLetterQueueName", env.prefix("todo-sharing-dead-letter-queue"))
        .with_parameter("maxReceiveCount", "3");
    with_base(env, desc, env.prefix("Messaging"))
}

fn activemq(env: &ApplicationEnvironment) -> StackDescriptor {
    let desc = StackDescriptor::new("activemq")
        .with_declared_outputs(ACTIVEMQ_OUTPUTS)
        .with_required_input("network", "vpcId")
        .with_required_input("network", "isolatedSubnetIds")
        .with_resource("amqSecurityGroup", "AWS::EC2::SecurityGroup")
        .with_resource("amqBroker", "AWS::AmazonMQ::Broker")
        .with_parameter("engineType", "ACTIVEMQ")
        .with_parameter("engineVersion", "5.18")
        .with_parameter("hostInstanceType", "mq.t3.micro");
    with_base(env, desc, format!("{}-{}-ActiveMq", env.environment_name, env.application_name))
}

fn service(env: &ApplicationEnvironment, artifact: Option<&str>) -> Result<StackDescriptor, ConfigurationError> {
    let mut desc = StackDescriptor::new("service")
        .with_declared_outputs(["serviceName", "serviceUrl"])
        .with_required_input("network", "vpcId")
        .with_required_input("network", "ecsClusterName")
        .with_required_input("network", "httpsListenerArn")
        .with_required_input("network", "loadBalancerSecurityGroupId")
        .with_required_input("network", "isolatedSubnetIds")
        .with_required_input("domain", "recordName")
        .with_required_input("certificate", "sslCertArn")
        .with_required_input("docker-repository", "repositoryUri")
        .with_resource("TaskDefinition", "AWS::ECS::TaskDefinition")
        .with_resource("Service", "AWS::ECS::Service")
        .with_resource("TargetGroup", "AWS::ElasticLoadBalancingV2::TargetGroup")
        .with_parameter("dockerRepositoryName", env.docker_repository_name())
        .with_parameter("applicationUrl", env.application_url()?)
        .with_parameter(ARTIFACT_PARAMETER, artifact.unwrap_or_default());
    for (stack, keys) in [
        ("cognito", &COGNITO_OUTPUTS[..]),
        ("database", &DATABASE_OUTPUTS[..]),
        ("messaging", &MESSAGING_OUTPUTS[..]),
        ("activemq", &ACTIVEMQ_OUTPUTS[..]),
    ] {
        for key in keys {
            desc = desc.with_required_input(stack, *key);
        }
    }
    Ok(with_base(
        env,
        desc,
        format!("{}-{}-Service", env.environment_name, env.application_name),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> ApplicationEnvironment {
        ApplicationEnvironment::new("todo", "staging", "123456789012", "us-east-2")
            .with_domain("example.com", "todo.example.com")
            .with_login_page_domain_prefix("todo-login")
    }

    fn find<'a>(catalog: &'a [StackDescriptor], name: &str) -> &'a StackDescriptor {
        catalog.iter().find(|d| d.name == name).unwrap()
    }

    #[test]
    fn test_catalog_has_nine_valid_stacks() {
        let catalog = todo_app_catalog(&env(), Some("1.4.2")).unwrap();
        let names: Vec<_> = catalog.iter().map(|d| d.name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "network",
                "certificate",
                "domain",
                "cognito",
                "docker-repository",
                "database",
                "messaging",
                "activemq",
                "service"
            ]
        );
        for desc in &catalog {
            desc.validate().unwrap();
        }
    }

    #[test]
    fn test_service_consumes_upstream_outputs_and_artifact() {
        let catalog = todo_app_catalog(&env(), Some("1.4.2")).unwrap();
        let service = find(&catalog, "service");

        assert_eq!(
            service.upstream_stacks().into_iter().collect::<Vec<_>>(),
            vec![
                "activemq",
                "certificate",
                "cognito",
                "database",
                "docker-repository",
                "domain",
                "messaging",
                "network"
            ]
        );
        assert!(service.required_inputs.iter().any(|i| i.stack == "database" && i.key == "endpointAddress"));
        assert_eq!(service.parameters.get(ARTIFACT_PARAMETER).map(String::as_str), Some("1.4.2"));
        assert_eq!(
            service.parameters.get("stackName").map(String::as_str),
            Some("staging-todo-Service")
        );
    }

    #[test]
    fn test_roots_have_no_inputs() {
        let catalog = todo_app_catalog(&env(), None).unwrap();
        for root in ["network", "certificate", "cognito", "docker-repository", "messaging"] {
            assert!(find(&catalog, root).required_inputs.is_empty(), "{root} should be a root");
        }
        assert_eq!(
            find(&catalog, "domain").upstream_stacks().into_iter().collect::<Vec<_>>(),
            vec!["network"]
        );
    }

    #[test]
    fn test_data_tier_reads_network_subnets() {
        let catalog = todo_app_catalog(&env(), None).unwrap();
        for stack in ["database", "activemq"] {
            let desc = find(&catalog, stack);
            assert_eq!(desc.upstream_stacks().into_iter().collect::<Vec<_>>(), vec!["network"]);
            assert!(desc.required_inputs.iter().any(|i| i.key == "isolatedSubnetIds"));
        }
        assert_eq!(
            find(&catalog, "database").parameters.get("stackName").map(String::as_str),
            Some("staging-todo-Database")
        );
        assert_eq!(find(&catalog, "database").declared_outputs.len(), 6);
    }

    #[test]
    fn test_missing_artifact_leaves_empty_parameter() {
        let catalog = todo_app_catalog(&env(), None).unwrap();
        assert_eq!(
            find(&catalog, "service").parameters.get(ARTIFACT_PARAMETER).map(String::as_str),
            Some("")
        );
    }

    #[test]
    fn test_missing_domain_fails_fast() {
        let env = ApplicationEnvironment::new("todo", "staging", "123456789012", "us-east-2");
        assert!(todo_app_catalog(&env, None).is_err());
    }
}
