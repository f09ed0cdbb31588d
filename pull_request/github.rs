use serde::Deserialize;

use super::{RepositoryApi, RepositoryHandle};
use crate::{credentials::Credential, Error, Result};

const PER_PAGE: usize = 100;
const USER_AGENT: &str = concat!("changed-tests/", env!("CARGO_PKG_VERSION"));

/// GitHub (or GitHub Enterprise) REST API.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitHub;

impl RepositoryApi for GitHub {
    type Handle = GitHubClient;

    fn connect(&self, api_url: &str, credential: &Credential) -> Result<GitHubClient> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| Error::Connect {
                api_url: api_url.to_string(),
                message: error.to_string(),
            })?;
        Ok(GitHubClient {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            credential: credential.clone(),
        })
    }
}

#[derive(Debug)]
pub struct GitHubClient {
    client: reqwest::blocking::Client,
    api_url: String,
    credential: Credential,
}

#[derive(Debug, Deserialize)]
struct PullRequestFile {
    filename: String,
}

impl GitHubClient {
    fn fetch_page(&self, url: &str) -> Result<Vec<PullRequestFile>> {
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        let request = match &self.credential {
            Credential::UsernamePassword { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credential::Token(token) => request.bearer_auth(token),
        };

        let response = request.send().map_err(|error| Error::RemoteApi {
            status: None,
            message: error.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(Error::RemoteApi {
                status: Some(status.as_u16()),
                message,
            });
        }

        response.json().map_err(|error| Error::RemoteApi {
            status: Some(status.as_u16()),
            message: error.to_string(),
        })
    }
}

impl RepositoryHandle for GitHubClient {
    fn changed_files(&self, repository: &str, number: u64) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for page in 1.. {
            let url = files_url(&self.api_url, repository, number, page);
            tracing::debug!(url = %url, "Fetching pull request files");
            let batch = self.fetch_page(&url)?;
            let last = is_last_page(batch.len());
            files.extend(batch.into_iter().map(|file| file.filename));
            if last {
                break;
            }
        }
        Ok(files)
    }
}

fn files_url(api_url: &str, repository: &str, number: u64, page: usize) -> String {
    format!("{api_url}/repos/{repository}/pulls/{number}/files?per_page={PER_PAGE}&page={page}")
}

fn is_last_page(len: usize) -> bool {
    len < PER_PAGE
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Write},
        net::TcpListener,
        sync::mpsc,
        thread,
    };

    use super::*;

    /// Answer one connection per response, sending each request head back
    /// over the channel.
    fn serve(
        responses: Vec<(u16, String)>,
    ) -> (String, mpsc::Receiver<String>, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let api_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            for (status, body) in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);
                let mut head = String::new();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                    head.push_str(&line);
                }
                tx.send(head).unwrap();

                let mut stream = reader.into_inner();
                write!(
                    stream,
                    "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                )
                .unwrap();
                stream.flush().unwrap();
            }
        });
        (api_url, rx, handle)
    }

    fn files_body(names: impl IntoIterator<Item = String>) -> String {
        serde_json::Value::Array(
            names
                .into_iter()
                .map(|name| serde_json::json!({ "filename": name, "status": "modified" }))
                .collect(),
        )
        .to_string()
    }

    fn request_line(head: &str) -> &str {
        head.lines().next().unwrap_or_default()
    }

    fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
        head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    #[test]
    fn test_files_url() {
        insta::assert_snapshot!(files_url("https://api.github.com", "octo/widgets", 7, 2), @"https://api.github.com/repos/octo/widgets/pulls/7/files?per_page=100&page=2");
    }

    #[test]
    fn test_connect_trims_api_url() {
        let client = GitHub
            .connect("https://github.example.com/api/v3/", &Credential::Token("t".into()))
            .unwrap();
        assert_eq!(client.api_url, "https://github.example.com/api/v3");
    }

    #[test]
    fn test_last_page() {
        assert!(is_last_page(0));
        assert!(is_last_page(99));
        assert!(!is_last_page(100));
    }

    #[test]
    fn test_file_payload() {
        let files: Vec<PullRequestFile> = serde_json::from_str(
            r#"[{"sha": "abc", "filename": "src/a.rs", "status": "modified", "additions": 1}]"#,
        )
        .unwrap();
        assert_eq!(files[0].filename, "src/a.rs");
    }

    #[test]
    fn test_unreachable_api_is_an_error() {
        let client = GitHub
            .connect("http://127.0.0.1:9", &Credential::Token("t".into()))
            .unwrap();
        assert!(matches!(
            client.changed_files("octo/widgets", 1).unwrap_err(),
            Error::RemoteApi { status: None, .. }
        ));
    }

    #[test]
    fn test_paged_listing_in_api_order() {
        let first_page = (0..PER_PAGE).map(|i| format!("src/file{i:03}.rs"));
        let (api_url, requests, server) = serve(vec![
            (200, files_body(first_page)),
            (200, files_body(["docs/last.md".to_string()])),
        ]);
        let client = GitHub
            .connect(&format!("{api_url}/"), &Credential::Token("t0ken".into()))
            .unwrap();

        let files = client.changed_files("octo/widgets", 7).unwrap();
        server.join().unwrap();
        assert_eq!(files.len(), PER_PAGE + 1);
        assert_eq!(files[0], "src/file000.rs");
        assert_eq!(files[PER_PAGE - 1], "src/file099.rs");
        assert_eq!(files[PER_PAGE], "docs/last.md");

        let heads = requests.try_iter().collect::<Vec<_>>();
        assert_eq!(
            heads.iter().map(|head| request_line(head)).collect::<Vec<_>>(),
            [
                "GET /repos/octo/widgets/pulls/7/files?per_page=100&page=1 HTTP/1.1",
                "GET /repos/octo/widgets/pulls/7/files?per_page=100&page=2 HTTP/1.1",
            ]
        );
        assert_eq!(header(&heads[0], "accept"), Some("application/vnd.github+json"));
        assert_eq!(header(&heads[0], "x-github-api-version"), Some("2022-11-28"));
    }

    #[test]
    fn test_bearer_auth_for_token() {
        let (api_url, requests, server) = serve(vec![(200, "[]".to_string())]);
        let client = GitHub
            .connect(&api_url, &Credential::Token("t0ken".into()))
            .unwrap();

        assert!(client.changed_files("octo/widgets", 1).unwrap().is_empty());
        server.join().unwrap();
        let head = requests.recv().unwrap();
        assert_eq!(header(&head, "authorization"), Some("Bearer t0ken"));
    }

    #[test]
    fn test_basic_auth_for_username_password() {
        let (api_url, requests, server) = serve(vec![(200, "[]".to_string())]);
        let credential = Credential::UsernamePassword {
            username: "user".into(),
            password: "pass".into(),
        };
        let client = GitHub.connect(&api_url, &credential).unwrap();

        assert!(client.changed_files("octo/widgets", 1).unwrap().is_empty());
        server.join().unwrap();
        let head = requests.recv().unwrap();
        assert_eq!(header(&head, "authorization"), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn test_unauthorized_is_an_error() {
        let (api_url, _requests, server) = serve(vec![(
            401,
            r#"{"message":"Bad credentials"}"#.to_string(),
        )]);
        let client = GitHub
            .connect(&api_url, &Credential::Token("expired".into()))
            .unwrap();

        let error = client.changed_files("octo/widgets", 1).unwrap_err();
        server.join().unwrap();
        match error {
            Error::RemoteApi { status, message } => {
                assert_eq!(status, Some(401));
                assert!(message.contains("Bad credentials"), "{message}");
            }
            error => panic!("expected a remote API error, got {error:?}"),
        }
    }
}
