use std::{collections::HashMap, fmt, sync::OnceLock};

use regex::{Captures, Regex, RegexBuilder};

/// Unpacks P.A.C.K.E.R. packed js code.
pub fn unpack(source: &str) -> Result<String, UnpackError> {
    static WORD_RE: OnceLock<Regex> = OnceLock::new();

    let args = filter_args(source)?;

    if args.count != args.symtab.len() {
        return Err(UnpackError {
            message: "Malformed p.a.c.k.e.r. symtab.",
        });
    }

    let payload = args.payload.replace("\\\\", "\\").replace("\\'", "'");
    let source = WORD_RE
        .get_or_init(|| Regex::new(r"\b\w+\b").unwrap())
        .replace_all(&payload, |cap: &Captures| {
            let word = &cap[0];
            unbase(args.radix, word)
                .and_then(|idx| args.symtab.get(idx))
                .filter(|sym| !sym.is_empty())
                .map(|sym| sym.to_string())
                .unwrap_or_else(|| word.to_owned())
        });

    Ok(source.into_owned())
}

/// Unpacks every packed `eval(...)` block of a page, blocks that fail are skipped.
pub fn unpack_all(html: &str) -> Vec<String> {
    static EVAL_RE: OnceLock<Regex> = OnceLock::new();

    EVAL_RE
        .get_or_init(|| {
            RegexBuilder::new(r"eval\(function\(p,a,c,k,e,.*?\.split\('\|'\)[^)]*\)\)")
                .dot_matches_new_line(true)
                .build()
                .unwrap()
        })
        .find_iter(html)
        .filter_map(|m| unpack(m.as_str()).ok())
        .collect()
}

#[derive(Debug)]
pub struct UnpackError {
    message: &'static str,
}

impl fmt::Display for UnpackError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unpack error: {}", &self.message)
    }
}

impl std::error::Error for UnpackError {}

const ALPHABET_62: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHABET_95: &str = r##" !\"#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_`abcdefghijklmnopqrstuvwxyz{|}~"##;

fn unbase(radix: u32, word: &str) -> Option<usize> {
    static ALPHABET_62_DICT: OnceLock<HashMap<char, u32>> = OnceLock::new();
    static ALPHABET_95_DICT: OnceLock<HashMap<char, u32>> = OnceLock::new();

    match radix {
        2..=36 => usize::from_str_radix(word, radix).ok(),
        37..=62 => dict_convert(
            radix,
            word,
            ALPHABET_62_DICT.get_or_init(|| alphabet_dict(ALPHABET_62)),
        ),
        _ => dict_convert(
            radix,
            word,
            ALPHABET_95_DICT.get_or_init(|| alphabet_dict(ALPHABET_95)),
        ),
    }
}

fn alphabet_dict(alphabet: &str) -> HashMap<char, u32> {
    alphabet
        .chars()
        .enumerate()
        .map(|(idx, ch)| (ch, idx as u32))
        .collect()
}

fn dict_convert(radix: u32, word: &str, dict: &HashMap<char, u32>) -> Option<usize> {
    word.chars().rev().enumerate().try_fold(0usize, |acc, (i, ch)| {
        let digit = *dict.get(&ch)? as usize;
        let weight = (radix as usize).checked_pow(i as u32)?;
        acc.checked_add(digit.checked_mul(weight)?)
    })
}

struct PackedArgs<'a> {
    payload: &'a str,
    symtab: Vec<&'a str>,
    radix: u32,
    count: usize,
}

fn filter_args(source: &str) -> Result<PackedArgs<'_>, UnpackError> {
    static JUICER1: OnceLock<Regex> = OnceLock::new();
    static JUICER2: OnceLock<Regex> = OnceLock::new();

    let juicers = [
        JUICER1.get_or_init(|| {
            RegexBuilder::new(
                r"}\('(.*)', *(\d+|\[\]), *(\d+), *'(.*)'\.split\('\|'\), *(\d+), *(.*)\)\)",
            )
            .dot_matches_new_line(true)
            .build()
            .unwrap()
        }),
        JUICER2.get_or_init(|| {
            RegexBuilder::new(r"}\('(.*)', *(\d+|\[\]), *(\d+), *'(.*)'\.split\('\|'\)")
                .dot_matches_new_line(true)
                .build()
                .unwrap()
        }),
    ];

    juicers
        .into_iter()
        .find_map(|juicer| {
            let caps = juicer.captures(source)?;
            let radix = match caps.get(2)?.as_str() {
                "[]" => 62,
                radix => radix.parse::<u32>().ok()?,
            };

            Some(PackedArgs {
                payload: caps.get(1)?.as_str(),
                symtab: caps.get(4)?.as_str().split('|').collect(),
                radix,
                count: caps.get(3)?.as_str().parse::<usize>().ok()?,
            })
        })
        .ok_or(UnpackError {
            message: "Could not make sense of p.a.c.k.e.r data (unexpected code structure)",
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    static SIMPLE: &str = "eval(function(p,a,c,k,e,r){e=String;if(!''\
    .replace(/^/,String)){while(c--)r[c]=k[c]||c;k=[function(e){return r[e]}];e=\
    function(){return'\\w+'};c=1};while(c--)if(k[c])p=p.replace(new RegExp('\\b'+\
    e(c)+'\\b','g'),k[c]);return p}('1 0=2;3(0)',4,4,'x|var|5|alert'.split('|'),0,{}))";

    static PLAYER: &str = r##"eval(function(p,a,c,k,e,d){while(c--)if(k[c])p=p.replace(new RegExp('\\b'+c.toString(a)+'\\b','g'),k[c]);return p}('2({0:"1"})',10,3,'sources|https://cdn.example.com/hls/master.m3u8|jwplayer'.split('|')))"##;

    #[test]
    fn should_ignore_plain_scripts() {
        assert!(unpack_all("<script>var a = 1;</script>").is_empty());
    }

    #[test]
    fn should_unpack_code() {
        assert_eq!(unpack(SIMPLE).unwrap(), "var x=5;alert(x)");
        assert_eq!(
            unpack(PLAYER).unwrap(),
            r#"jwplayer({sources:"https://cdn.example.com/hls/master.m3u8"})"#
        );
    }

    #[test]
    fn should_unpack_all_blocks_of_page() {
        let html = format!("<script>var x;</script><script>{PLAYER}</script>");
        let unpacked = unpack_all(&html);

        assert_eq!(unpacked.len(), 1);
        assert!(unpacked[0].contains("master.m3u8"));
    }

    #[test]
    fn should_fail_on_unexpected_structure() {
        assert!(unpack("eval(function(p,a,c,k,e,d){}").is_err());
    }
}
