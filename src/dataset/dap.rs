//! Minimal OPeNDAP (DAP2) access over HTTP.
//!
//! Only what the downloader needs is spoken: the `.html` form as an existence
//! probe, the `.dds` structure description, and `.ascii` responses for whole
//! variables.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use futures::StreamExt;
use indicatif::ProgressStyle;
use tracing::{debug, warn};

use super::{CoordinateVector, Dataset, DatasetSource, GridVariable};
use crate::{
    cli::create_spinner,
    config::FetchSettings,
    error::{Error, Result},
};

/// Name of the coordinate variable indexed by grid row.
pub const ROW_COORDINATE: &str = "y";
/// Name of the coordinate variable indexed by grid column.
pub const COLUMN_COORDINATE: &str = "x";

#[derive(Debug, Clone)]
pub struct DapClient {
    client: reqwest::Client,
    retries: u32,
    retry_delay: Duration,
}

impl DapClient {
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(DapClient {
            client,
            retries: settings.retries,
            retry_delay: Duration::from_secs(settings.retry_delay_secs),
        })
    }

    /// Checks that the server knows the dataset by requesting its html form.
    pub async fn probe(&self, url: &str) -> Result<()> {
        self.get(&format!("{}.html", url)).await.map(|_| ())
    }

    /// GET with the retry budget applied to transport errors and 5xx answers.
    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let mut attempt = 0;

        loop {
            let reason = match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if !response.status().is_server_error() => {
                    return Err(Error::RemoteUnavailable {
                        url: url.to_string(),
                        reason: response.status().to_string(),
                    })
                }
                Ok(response) => response.status().to_string(),
                Err(e) => e.to_string(),
            };

            if attempt >= self.retries {
                return Err(Error::RemoteUnavailable {
                    url: url.to_string(),
                    reason,
                });
            }

            attempt += 1;
            warn!(%url, %reason, attempt, "request failed, retrying");
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        let total_size = response.content_length().unwrap_or(0);

        let spinner = create_spinner(format!("Fetching {}", url));
        if total_size > 0 {
            spinner.set_length(total_size);
            spinner.set_style(
                ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
        }

        let mut body = Vec::with_capacity(total_size as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    spinner.abandon();
                    return Err(Error::RemoteUnavailable {
                        url: url.to_string(),
                        reason: format!("error reading body: {}", e),
                    });
                }
            };
            body.extend_from_slice(&chunk);
            spinner.inc(chunk.len() as u64);
        }
        spinner.finish_and_clear();
        debug!(%url, bytes = body.len(), "response received");

        String::from_utf8(body).map_err(|_| Error::Protocol(format!("{} is not utf-8", url)))
    }
}

#[async_trait]
impl DatasetSource for DapClient {
    async fn open(&self, url: &str, variables: &[String]) -> Result<Dataset> {
        self.probe(url).await?;

        let dds = parse_dds(&self.get_text(&format!("{}.dds", url)).await?)?;

        let mut grids: Vec<&Declaration> = Vec::new();
        for name in variables {
            if grids.iter().any(|g| &g.name == name) {
                continue;
            }
            match dds.get(name) {
                Some(declaration) if declaration.shape.len() >= 3 => grids.push(declaration),
                Some(declaration) => {
                    warn!(variable = %name, shape = ?declaration.shape, "not a forecast grid")
                }
                None => debug!(variable = %name, %url, "variable not in dataset"),
            }
        }

        // Grids sharing a horizon axis get it once; the ascii response names
        // map vectors without their grid prefix anyway.
        let mut projection = vec![COLUMN_COORDINATE.to_string(), ROW_COORDINATE.to_string()];
        let mut horizon_axes: Vec<&str> = Vec::new();
        for grid in &grids {
            let horizon = grid.dimensions[0].as_str();
            if !horizon_axes.contains(&horizon) {
                horizon_axes.push(horizon);
                if grid.maps.iter().any(|m| m == horizon) {
                    projection.push(format!("{}.{}", grid.name, horizon));
                } else {
                    projection.push(horizon.to_string());
                }
            }
            projection.push(format!("{}.{}", grid.name, grid.name));
        }

        let body = self
            .get_text(&format!("{}.ascii?{}", url, projection.join(",")))
            .await?;
        let arrays = parse_ascii(&body)?;

        let take = |name: &str| {
            arrays
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Protocol(format!("`{}` missing from {}", name, url)))
        };

        let mut dataset = Dataset::new(
            CoordinateVector(take(ROW_COORDINATE)?),
            CoordinateVector(take(COLUMN_COORDINATE)?),
        );
        for grid in grids {
            let horizons = take(grid.dimensions[0].as_str())?;
            let values = take(grid.name.as_str())?;
            dataset.insert(GridVariable::new(
                &grid.name,
                grid.dimensions.clone(),
                grid.shape.clone(),
                horizons,
                values,
            )?);
        }

        Ok(dataset)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// One variable as described by a DDS.
pub struct Declaration {
    pub name: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    /// Map vectors, for Grids.
    pub maps: Vec<String>,
}

/// Parses a DAP2 Dataset Descriptor Structure into its top level variables.
///
/// Grids are reported by their array part. Structures and Sequences are
/// skipped.
pub fn parse_dds(dds: &str) -> Result<HashMap<String, Declaration>> {
    let mut declarations = HashMap::new();
    let mut lines = dds.lines().map(str::trim).filter(|l| !l.is_empty());

    match lines.next() {
        Some(line) if line.starts_with("Dataset") && line.ends_with('{') => {}
        _ => return Err(Error::Protocol("DDS does not start with `Dataset {`".to_string())),
    }

    let mut grid: Option<Declaration> = None;
    let mut in_maps = false;
    let mut skip_depth = 0;

    for line in lines {
        if skip_depth > 0 {
            if line.ends_with('{') {
                skip_depth += 1;
            } else if line.starts_with('}') {
                skip_depth -= 1;
            }
            continue;
        }

        if line == "Grid {" {
            grid = Some(Declaration {
                name: String::new(),
                dimensions: vec![],
                shape: vec![],
                maps: vec![],
            });
            in_maps = false;
        } else if line.ends_with('{') {
            skip_depth = 1;
        } else if line == "ARRAY:" {
            in_maps = false;
        } else if line == "MAPS:" {
            in_maps = true;
        } else if let Some(rest) = line.strip_prefix('}') {
            match grid.take() {
                Some(mut g) => {
                    g.name = rest.trim().trim_end_matches(';').trim().to_string();
                    declarations.insert(g.name.clone(), g);
                }
                None => return Ok(declarations),
            }
        } else {
            let declaration = parse_declaration(line)?;
            match grid.as_mut() {
                Some(g) if in_maps => g.maps.push(declaration.name),
                Some(g) => {
                    g.dimensions = declaration.dimensions;
                    g.shape = declaration.shape;
                }
                None => {
                    declarations.insert(declaration.name.clone(), declaration);
                }
            }
        }
    }

    Err(Error::Protocol("DDS ended before the closing brace".to_string()))
}

// `Float32 name[dim = 12][y = 200];` or `Int32 name;`
fn parse_declaration(line: &str) -> Result<Declaration> {
    let malformed = || Error::Protocol(format!("malformed declaration `{}`", line));

    let (_, rest) = line
        .trim_end_matches(';')
        .split_once(char::is_whitespace)
        .ok_or_else(malformed)?;
    let rest = rest.trim();

    let (name, dims) = match rest.find('[') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };

    let mut dimensions = Vec::new();
    let mut shape: Vec<usize> = Vec::new();
    for dim in dims.split('[').skip(1) {
        let dim = dim.trim().strip_suffix(']').ok_or_else(malformed)?;
        let (dim_name, size) = match dim.split_once('=') {
            Some((n, s)) => (n.trim(), s.trim()),
            None => ("", dim.trim()),
        };
        dimensions.push(dim_name.to_string());
        shape.push(size.parse().map_err(|_| malformed())?);
    }

    Ok(Declaration {
        name: name.trim().to_string(),
        dimensions,
        shape,
        maps: vec![],
    })
}

/// Parses the data section of a DAP2 `.ascii` response into flattened arrays,
/// keyed by variable name. A grid projection `var.part` is keyed by `part`.
pub fn parse_ascii(body: &str) -> Result<HashMap<String, Vec<f64>>> {
    let data = match body.find("\n-----") {
        Some(i) => {
            let after = &body[i + 1..];
            after.split_once('\n').map(|(_, rest)| rest).unwrap_or("")
        }
        None => body,
    };

    let mut arrays = HashMap::new();
    let mut current: Option<(String, usize, Vec<f64>)> = None;

    for line in data.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if is_array_header(line) {
            if let Some(array) = current.take() {
                finish_array(&mut arrays, array)?;
            }
            current = Some(parse_array_header(line)?);
            continue;
        }

        let (_, _, values) = current
            .as_mut()
            .ok_or_else(|| Error::Protocol(format!("data before any header: `{}`", line)))?;

        let line = if line.starts_with('[') {
            line.split_once(',').map(|(_, v)| v).unwrap_or("")
        } else {
            line
        };
        for value in line.split(',').map(str::trim).filter(|v| !v.is_empty()) {
            let value = value
                .parse::<f64>()
                .map_err(|_| Error::Protocol(format!("bad value `{}`", value)))?;
            values.push(value);
        }
    }

    if let Some(array) = current.take() {
        finish_array(&mut arrays, array)?;
    }

    Ok(arrays)
}

fn is_array_header(line: &str) -> bool {
    !line.starts_with('[') && line.ends_with(']') && !line.contains(',')
}

fn parse_array_header(line: &str) -> Result<(String, usize, Vec<f64>)> {
    let malformed = || Error::Protocol(format!("malformed array header `{}`", line));

    let i = line.find('[').ok_or_else(malformed)?;
    let name = line[..i].rsplit('.').next().unwrap_or_default().to_string();

    let mut len = 1;
    for size in line[i..].split('[').skip(1) {
        let size: usize = size
            .strip_suffix(']')
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(malformed)?;
        len *= size;
    }

    Ok((name, len, Vec::with_capacity(len)))
}

fn finish_array(
    arrays: &mut HashMap<String, Vec<f64>>,
    (name, len, values): (String, usize, Vec<f64>),
) -> Result<()> {
    if values.len() != len {
        return Err(Error::Protocol(format!(
            "`{}` has {} values, header declares {}",
            name,
            values.len(),
            len
        )));
    }
    arrays.insert(name, values);

    Ok(())
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use std::sync::{Arc, Mutex};

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    const POP12: &str = "Total_precipitation_surface_12_Hour_Accumulation_probability_above_0p254";

    fn dds_fixture() -> String {
        format!(
            "Dataset {{
    Float32 x[x = 3];
    Float32 y[y = 2];
    Int32 time1[time1 = 2];
    Grid {{
      ARRAY:
        Float32 {v}[time1 = 2][height_above_ground1 = 1][y = 2][x = 3];
      MAPS:
        Int32 time1[time1 = 2];
        Float32 height_above_ground1[height_above_ground1 = 1];
        Float32 y[y = 2];
        Float32 x[x = 3];
    }} {v};
    Structure {{
        Int32 inner;
    }} skipped;
    Int32 LambertConformal_Projection;
}} nws/ndfd/201601/20160101/2016010100ds.midatlan.oper.bin;
",
            v = POP12
        )
    }

    #[test]
    fn should_parse_grid_declaration() {
        let dds = parse_dds(&dds_fixture()).unwrap();
        let grid = dds.get(POP12).unwrap();

        assert_eq!(
            grid.dimensions,
            vec!["time1", "height_above_ground1", "y", "x"]
        );
        assert_eq!(grid.shape, vec![2, 1, 2, 3]);
        assert_eq!(grid.maps, vec!["time1", "height_above_ground1", "y", "x"]);
    }

    #[test]
    fn should_parse_plain_declarations() {
        let dds = parse_dds(&dds_fixture()).unwrap();

        assert_eq!(dds.get("x").unwrap().shape, vec![3]);
        assert_eq!(dds.get("y").unwrap().dimensions, vec!["y"]);
        assert!(dds.get("LambertConformal_Projection").unwrap().shape.is_empty());
        assert!(dds.get("skipped").is_none());
        assert!(dds.get("inner").is_none());
    }

    #[test]
    fn should_reject_truncated_dds() {
        assert!(matches!(
            parse_dds("Dataset {\n    Float32 x[x = 3];\n"),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(parse_dds("<html>"), Err(Error::Protocol(_))));
    }

    #[test]
    fn should_parse_ascii_arrays() {
        let body = format!(
            "Dataset {{
    Float32 x[x = 3];
}} nws/ndfd/file;
---------------------------------------------
x[3]
-1.5, 0.0, 1.5

{v}.time1[2]
12, 24

{v}.{v}[2][1][2][3]
[0][0][0], 1.0, 2.0, 3.0
[0][0][1], 4.0, NaN, 6.0
[1][0][0], 7.0, 8.0, 9.0
[1][0][1], 10.0, 11.0, 12.0
",
            v = POP12
        );
        let arrays = parse_ascii(&body).unwrap();

        assert_eq!(arrays.get("x").unwrap(), &vec![-1.5, 0.0, 1.5]);
        assert_eq!(arrays.get("time1").unwrap(), &vec![12.0, 24.0]);

        let values = arrays.get(POP12).unwrap();
        assert_eq!(values.len(), 12);
        assert_eq!(values[0], 1.0);
        assert!(values[4].is_nan());
        assert_eq!(values[11], 12.0);
    }

    #[test]
    fn should_reject_short_ascii_array() {
        let body = "x[3]\n1.0, 2.0\n";
        assert!(matches!(parse_ascii(body), Err(Error::Protocol(_))));
    }

    #[test]
    fn should_build_client_from_settings() {
        let client = DapClient::new(&FetchSettings::default()).unwrap();
        assert_eq!(client.retries, FetchSettings::default().retries);
    }

    // -- Client against a local server ---------------------------------------

    type Requests = Arc<Mutex<Vec<String>>>;

    const SHARED_AXIS_DDS: &str = "Dataset {
    Float32 x[x = 3];
    Float32 y[y = 2];
    Int32 time1[time1 = 2];
    Grid {
      ARRAY:
        Float32 Pop[time1 = 2][y = 2][x = 3];
      MAPS:
        Int32 time1[time1 = 2];
        Float32 y[y = 2];
        Float32 x[x = 3];
    } Pop;
    Grid {
      ARRAY:
        Float32 Qpf[time1 = 2][y = 2][x = 3];
      MAPS:
        Int32 time1[time1 = 2];
        Float32 y[y = 2];
        Float32 x[x = 3];
    } Qpf;
} f;
";

    const SHARED_AXIS_ASCII: &str = "Dataset {
} f;
---------------------------------------------
x[3]
33.0, 33.5, 34.0

y[2]
-80.0, -79.9

Pop.time1[2]
12, 24

Pop.Pop[2][2][3]
[0][0], 1, 2, 3
[0][1], 4, 5, 6
[1][0], 7, 8, 9
[1][1], 10, 11, 12

Qpf.Qpf[2][2][3]
[0][0], 0.5, 0.5, 0.5
[0][1], 0.5, 0.5, 0.5
[1][0], 1.5, 1.5, 1.5
[1][1], 1.5, 1.5, 1.5
";

    /// Answers every request with `respond(path)` on a local port and records
    /// the requested paths.
    async fn serve<F>(respond: F) -> (String, Requests)
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Requests::default();
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }

                let head = String::from_utf8_lossy(&head).to_string();
                let path = head.split_whitespace().nth(1).unwrap_or_default().to_string();
                seen.lock().unwrap().push(path.clone());

                let (status, body) = respond(&path);
                let response = format!(
                    "HTTP/1.1 {} Status\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (base, requests)
    }

    fn shared_axis_server(path: &str) -> (u16, String) {
        if path.ends_with(".html") {
            (200, "<html></html>".to_string())
        } else if path.ends_with(".dds") {
            (200, SHARED_AXIS_DDS.to_string())
        } else if path.contains(".ascii?") {
            (200, SHARED_AXIS_ASCII.to_string())
        } else {
            (404, String::new())
        }
    }

    fn client(retries: u32) -> DapClient {
        DapClient::new(&FetchSettings {
            timeout_secs: 10,
            retries,
            retry_delay_secs: 0,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn should_open_grids_sharing_a_horizon_axis() {
        let (base, requests) = serve(shared_axis_server).await;
        let url = format!("{}/f", base);

        let dataset = client(0)
            .open(&url, &["Pop".to_string(), "Qpf".to_string()])
            .await
            .unwrap();

        assert_eq!(dataset.rows.0, vec![-80.0, -79.9]);
        assert_eq!(dataset.columns.0, vec![33.0, 33.5, 34.0]);
        for name in ["Pop", "Qpf"] {
            let variable = dataset.variable(name).unwrap();
            assert_eq!(variable.horizons, vec![12.0, 24.0]);
            assert_eq!(variable.horizon_index(24).unwrap(), 1);
        }
        let pop = dataset.variable("Pop").unwrap().slice(1).unwrap();
        let values: Vec<f64> = pop.cells().map(|(_, _, v)| v).collect();
        assert_eq!(values, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);

        assert_eq!(
            *requests.lock().unwrap(),
            vec![
                "/f.html".to_string(),
                "/f.dds".to_string(),
                "/f.ascii?x,y,Pop.time1,Pop.Pop,Qpf.Qpf".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn should_request_repeated_variable_once() {
        let (base, requests) = serve(shared_axis_server).await;
        let url = format!("{}/f", base);

        let dataset = client(0)
            .open(&url, &["Pop".to_string(), "Pop".to_string(), "Absent".to_string()])
            .await
            .unwrap();

        assert!(dataset.variable("Pop").is_some());
        assert!(dataset.variable("Qpf").is_none());
        assert!(dataset.variable("Absent").is_none());
        assert_eq!(
            requests.lock().unwrap().last().unwrap(),
            "/f.ascii?x,y,Pop.time1,Pop.Pop"
        );
    }

    #[tokio::test]
    async fn should_not_retry_client_errors() {
        let (base, requests) = serve(|_| (404, String::new())).await;

        let result = client(2).open(&format!("{}/f", base), &["Pop".to_string()]).await;

        assert!(matches!(result, Err(Error::RemoteUnavailable { .. })));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_retry_server_errors() {
        let (base, requests) = serve(|_| (503, String::new())).await;

        let result = client(2).open(&format!("{}/f", base), &["Pop".to_string()]).await;

        assert!(matches!(result, Err(Error::RemoteUnavailable { .. })));
        assert_eq!(requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn should_retry_unreachable_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/f", listener.local_addr().unwrap());
        drop(listener);

        let result = client(1).open(&url, &["Pop".to_string()]).await;

        assert!(matches!(result, Err(Error::RemoteUnavailable { .. })));
    }
}
