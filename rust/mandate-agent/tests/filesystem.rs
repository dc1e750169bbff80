use mandate_agent::{Agent, FileSystemStorageBackend, data::PrincipalMeta};
use mandate_ucan::{Capability, Timestamp};
use pretty_assertions::assert_eq;
use testresult::TestResult;

type Backend = FileSystemStorageBackend<Vec<u8>, Vec<u8>>;

#[test_log::test(tokio::test)]
async fn it_reopens_a_profile_from_disk() -> TestResult {
    let root = tempfile::tempdir()?;

    let (did, space) = {
        let backend = Backend::new(root.path()).await?;
        let mut agent = Agent::create(backend, "work", PrincipalMeta::device("laptop")).await?;
        let space = agent.create_space("documents").await?;
        (agent.did(), space)
    };

    let backend = Backend::new(root.path()).await?;
    let agent = Agent::load(backend, "work").await?;
    assert_eq!(agent.did(), did);
    assert_eq!(agent.current_space(), Some(&space));

    let proofs = agent.proofs(
        &[Capability::new("store/list", space.as_str())],
        &agent.context(Timestamp::now()),
    )?;
    assert_eq!(proofs.len(), 1);
    assert_eq!(proofs[0].issuer(), &space);
    Ok(())
}
