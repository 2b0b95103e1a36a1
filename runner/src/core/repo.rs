//! Package repository definitions per OS family.

use crate::core::types::OsFamily;

const PACKAGE_BASE: &str = "https://packages.gitlab.com/runner/gitlab-runner";
const GPG_KEY_URL: &str = "https://packages.gitlab.com/gpg.key";
const APT_KEY_ID: &str = "1A4C919DB987D435939638B914219A96E15E78F4";
const APT_KEY_SERVER: &str = "keys.gnupg.net";
const CA_BUNDLE: &str = "/etc/pki/tls/certs/ca-bundle.crt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptSource {
    pub name: String,
    pub comment: String,
    pub location: String,
    pub release: String,
    pub repos: String,
    pub key_id: String,
    pub key_server: String,
    pub include_deb: bool,
    pub include_src: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YumRepo {
    pub name: String,
    pub baseurl: String,
    pub enabled: bool,
    pub gpgcheck: bool,
    pub gpgkey: String,
    pub repo_gpgcheck: bool,
    pub sslcacert: String,
    pub sslverify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoDefinition {
    Apt(AptSource),
    Yum(Vec<YumRepo>),
    None,
}

/// Repository entries for the host, keyed on OS family.
///
/// `distro` is the distribution id (e.g. `Ubuntu`), `release` its codename.
pub fn definition(family: OsFamily, distro: &str, release: &str) -> RepoDefinition {
    match family {
        OsFamily::Debian => RepoDefinition::Apt(AptSource {
            name: "apt_gitlabci".to_string(),
            comment: "GitlabCI Runner Repo".to_string(),
            location: format!("{PACKAGE_BASE}/{}/", distro.to_lowercase()),
            release: release.to_string(),
            repos: "main".to_string(),
            key_id: APT_KEY_ID.to_string(),
            key_server: APT_KEY_SERVER.to_string(),
            include_deb: true,
            include_src: false,
        }),
        OsFamily::RedHat => RepoDefinition::Yum(vec![
            yum_repo("runner_gitlab-runner", "$basearch"),
            yum_repo("runner_gitlab-runner-source", "SRPMS"),
        ]),
        OsFamily::Other => RepoDefinition::None,
    }
}

fn yum_repo(name: &str, arch_dir: &str) -> YumRepo {
    YumRepo {
        name: name.to_string(),
        baseurl: format!("{PACKAGE_BASE}/el/$releasever/{arch_dir}"),
        enabled: true,
        gpgcheck: false,
        gpgkey: GPG_KEY_URL.to_string(),
        repo_gpgcheck: true,
        sslcacert: CA_BUNDLE.to_string(),
        sslverify: true,
    }
}

impl AptSource {
    /// `sources.list.d` entry; the key is fetched separately by fingerprint.
    pub fn render(&self) -> String {
        let mut out = format!("# {}\n", self.comment);
        if self.include_deb {
            out.push_str(&format!(
                "deb {} {} {}\n",
                self.location, self.release, self.repos
            ));
        }
        if self.include_src {
            out.push_str(&format!(
                "deb-src {} {} {}\n",
                self.location, self.release, self.repos
            ));
        }
        out
    }
}

impl YumRepo {
    pub fn render(&self) -> String {
        format!(
            "[{name}]\nname={name}\nbaseurl={baseurl}\nenabled={enabled}\ngpgcheck={gpgcheck}\n\
             gpgkey={gpgkey}\nrepo_gpgcheck={repo_gpgcheck}\nsslcacert={sslcacert}\nsslverify={sslverify}\n",
            name = self.name,
            baseurl = self.baseurl,
            enabled = u8::from(self.enabled),
            gpgcheck = u8::from(self.gpgcheck),
            gpgkey = self.gpgkey,
            repo_gpgcheck = u8::from(self.repo_gpgcheck),
            sslcacert = self.sslcacert,
            sslverify = u8::from(self.sslverify),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debian_source_uses_lowercase_distro() {
        let RepoDefinition::Apt(source) = definition(OsFamily::Debian, "Ubuntu", "jammy") else {
            panic!("expected apt source");
        };
        assert_eq!(
            source.location,
            "https://packages.gitlab.com/runner/gitlab-runner/ubuntu/"
        );
        assert_eq!(source.key_id, APT_KEY_ID);
        assert!(source.include_deb);
        assert!(!source.include_src);
        assert_eq!(
            source.render(),
            "# GitlabCI Runner Repo\n\
             deb https://packages.gitlab.com/runner/gitlab-runner/ubuntu/ jammy main\n"
        );
    }

    #[test]
    fn redhat_has_binary_and_source_repos() {
        let RepoDefinition::Yum(repos) = definition(OsFamily::RedHat, "CentOS", "") else {
            panic!("expected yum repos");
        };
        assert_eq!(repos.len(), 2);
        assert_eq!(
            repos[0].baseurl,
            "https://packages.gitlab.com/runner/gitlab-runner/el/$releasever/$basearch"
        );
        assert_eq!(repos[1].name, "runner_gitlab-runner-source");
        assert_eq!(
            repos[1].baseurl,
            "https://packages.gitlab.com/runner/gitlab-runner/el/$releasever/SRPMS"
        );
        let rendered = repos[0].render();
        assert!(rendered.starts_with("[runner_gitlab-runner]\n"));
        assert!(rendered.contains("enabled=1\n"));
        assert!(rendered.contains("gpgcheck=0\n"));
        assert!(rendered.contains("repo_gpgcheck=1\n"));
        assert!(rendered.contains("sslcacert=/etc/pki/tls/certs/ca-bundle.crt\n"));
    }

    #[test]
    fn other_family_has_no_repo() {
        assert_eq!(definition(OsFamily::Other, "Arch", ""), RepoDefinition::None);
    }
}
