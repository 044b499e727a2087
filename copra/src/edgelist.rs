use crate::network::{Batch, Network};
use anyhow::{bail, format_err, Context, Error};
use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::SplitWhitespace;

fn open(path: &Path) -> Result<Box<dyn BufRead>, Error> {
    let file = BufReader::new(File::open(path).with_context(|| path.display().to_string())?);
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(file))
    }
}

fn vertex(fields: &mut SplitWhitespace, name: &str) -> Result<usize, Error> {
    Ok(fields
        .next()
        .ok_or_else(|| format_err!("missing {name}"))?
        .parse::<usize>()?)
}

fn weight(fields: &mut SplitWhitespace) -> Result<f64, Error> {
    let w = match fields.next() {
        Some(w) => w.parse::<f64>()?,
        None => 1.0,
    };
    if !(w.is_finite() && w >= 0.0) {
        bail!("invalid weight {w}");
    }
    Ok(w)
}

fn parse_edge(line: &str) -> Result<(usize, usize, f64), Error> {
    let mut fields = line.split_whitespace();
    let u = vertex(&mut fields, "SOURCE")?;
    let v = vertex(&mut fields, "TARGET")?;
    let w = weight(&mut fields)?;
    Ok((u, v, w))
}

fn parse_update(line: &str, batch: &mut Batch) -> Result<(), Error> {
    let mut fields = line.split_whitespace();
    match fields.next() {
        Some("-") => {
            let u = vertex(&mut fields, "SOURCE")?;
            let v = vertex(&mut fields, "TARGET")?;
            batch.deletions.push((u, v));
        }
        Some("+") => {
            let u = vertex(&mut fields, "SOURCE")?;
            let v = vertex(&mut fields, "TARGET")?;
            let w = weight(&mut fields)?;
            batch.insertions.push((u, v, w));
        }
        Some(op) => bail!("unknown update {op}"),
        None => bail!("empty update"),
    }
    Ok(())
}

fn is_comment(line: &str) -> bool {
    line.is_empty() || line.starts_with('%') || line.starts_with('#')
}

/// Read a whitespace separated edge list of `u v [w]` lines, with 0-based vertex keys and a
/// default weight of 1. Returns the number of vertices (largest key plus one) and the edges.
pub fn read_edges(reader: impl BufRead) -> Result<(usize, Vec<(usize, usize, f64)>), Error> {
    let mut edges = Vec::new();
    let mut span = 0;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if is_comment(line) {
            continue;
        }
        let edge = parse_edge(line).with_context(|| format!("line {}: {line}", i + 1))?;
        span = span.max(edge.0 + 1).max(edge.1 + 1);
        edges.push(edge);
    }
    Ok((span, edges))
}

/// Load a network from an edge list file, gzipped if the name ends in `.gz`.
pub fn load_edges(path: impl AsRef<Path>) -> Result<Network, Error> {
    let path = path.as_ref();
    let (span, edges) = read_edges(open(path)?).with_context(|| path.display().to_string())?;
    Network::from_edges(span, edges)
}

/// Read a batch of edge updates: `- u v` removes an edge, `+ u v [w]` adds one.
pub fn read_batch(reader: impl BufRead) -> Result<Batch, Error> {
    let mut batch = Batch::default();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if is_comment(line) {
            continue;
        }
        parse_update(line, &mut batch).with_context(|| format!("line {}: {line}", i + 1))?;
    }
    Ok(batch)
}

/// Load a batch of edge updates from a file, gzipped if the name ends in `.gz`.
pub fn load_batch(path: impl AsRef<Path>) -> Result<Batch, Error> {
    let path = path.as_ref();
    read_batch(open(path)?).with_context(|| path.display().to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_read_edges() {
        let text = "% comment\n0 1\n1 2 2.5\n\n# another\n4 1 0\n";
        let (span, edges) = read_edges(text.as_bytes()).unwrap();
        assert_eq!(span, 5);
        assert_eq!(edges, vec![(0, 1, 1.0), (1, 2, 2.5), (4, 1, 0.0)]);
    }

    #[test]
    fn test_read_edges_errors() {
        let err = read_edges("0 1\n2\n".as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"), "{err:#}");
        assert!(read_edges("0 x\n".as_bytes()).is_err());
        assert!(read_edges("0 1 -3\n".as_bytes()).is_err());
    }

    #[test]
    fn test_read_batch() {
        let text = "- 0 1\n+ 2 3 4\n+ 3 5\n";
        let batch = read_batch(text.as_bytes()).unwrap();
        assert_eq!(batch.deletions, vec![(0, 1)]);
        assert_eq!(batch.insertions, vec![(2, 3, 4.0), (3, 5, 1.0)]);
        assert!(read_batch("* 0 1\n".as_bytes()).is_err());
    }

    #[test]
    fn test_load_gz() -> Result<(), Error> {
        let path = std::env::temp_dir().join(format!("copra-edgelist-{}.txt.gz", std::process::id()));
        let mut gz = GzEncoder::new(File::create(&path)?, Compression::default());
        writeln!(gz, "0 1\n1 2 3")?;
        gz.finish()?;

        let n = load_edges(&path)?;
        std::fs::remove_file(&path)?;
        assert_eq!(n.nodes(), 3);
        assert_eq!(n.edges(), 2);
        assert_eq!(n.get_total_edge_weight(), 4.0);
        Ok(())
    }
}
